//! Deterministic hash-based embedding provider.
//!
//! Token-level random indexing: each token maps to a pseudo-random unit
//! direction derived from its digest, and a text embeds as the normalised
//! sum of its token directions. Texts sharing tokens land close together, so
//! the full search pipeline is exercisable offline and in tests without a
//! model download.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::error::Result;
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::Embedding;

pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn token_direction(&self, token: &str) -> Vec<f32> {
        let mut direction = Vec::with_capacity(self.dimensions);
        let mut counter = 0u32;
        let mut bytes: Vec<u8> = Vec::new();
        while direction.len() < self.dimensions {
            if bytes.is_empty() {
                let mut hasher = Sha256::new();
                hasher.update(token.as_bytes());
                hasher.update(counter.to_le_bytes());
                bytes = hasher.finalize().to_vec();
                counter += 1;
            }
            let b = bytes.remove(0);
            direction.push((b as f32 / 127.5) - 1.0);
        }
        direction
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() > 1)
        {
            tokens += 1;
            for (slot, value) in vector.iter_mut().zip(self.token_direction(token)) {
                *slot += value;
            }
        }
        if tokens > 0 {
            crate::embedding::l2_normalise(&mut vector);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts
            .iter()
            .map(|text| Embedding {
                vector: self.embed_text(text),
                model: "hash".to_string(),
                dimensions: self.dimensions,
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}
