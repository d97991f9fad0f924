//! Embedding provider implementations.

#[cfg(feature = "fastembed")]
pub mod fastembed;
pub mod hash;
pub mod ollama;

#[cfg(feature = "fastembed")]
pub use fastembed::FastEmbedProvider;
pub use hash::HashEmbeddingProvider;
pub use ollama::OllamaEmbeddingProvider;

use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;

/// Build the provider named in the configuration.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(config.dimensions))),
        "ollama" => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(OllamaEmbeddingProvider::new(
                base_url,
                config.model.clone(),
                config.dimensions,
            )?))
        }
        #[cfg(feature = "fastembed")]
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        other => Err(Error::config(format!(
            "unknown embedding provider {other:?}; supported: {}",
            supported_providers().join(", ")
        ))),
    }
}

pub fn supported_providers() -> Vec<&'static str> {
    let mut providers = vec!["hash", "ollama"];
    #[cfg(feature = "fastembed")]
    providers.push("fastembed");
    providers
}
