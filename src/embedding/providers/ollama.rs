//! Ollama embedding provider.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::Embedding;

pub struct OllamaEmbeddingProvider {
    base_url: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OllamaEmbeddingProvider {
    pub fn new(base_url: String, model: String, dimensions: usize) -> Result<Self> {
        Self::with_timeout(base_url, model, dimensions, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: String,
        model: String,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::embedding(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            model,
            dimensions,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The embeddings endpoint takes one prompt per request.
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let payload = serde_json::json!({
                "model": self.model,
                "prompt": text,
            });

            let response = self
                .client
                .post(format!(
                    "{}/api/embeddings",
                    self.base_url.trim_end_matches('/')
                ))
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::embedding("ollama request timed out")
                    } else {
                        Error::embedding(format!("HTTP request failed: {e}"))
                    }
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::embedding(format!(
                    "ollama API error {status}: {body}"
                )));
            }

            let data: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Error::embedding(format!("failed to parse response: {e}")))?;

            let vector: Vec<f32> = data["embedding"]
                .as_array()
                .ok_or_else(|| Error::embedding("response missing embedding array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();

            if vector.len() != self.dimensions {
                return Err(Error::embedding(format!(
                    "model {} returned {} dimensions, config expects {}",
                    self.model,
                    vector.len(),
                    self.dimensions
                )));
            }

            results.push(Embedding {
                vector,
                model: self.model.clone(),
                dimensions: self.dimensions,
            });
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
