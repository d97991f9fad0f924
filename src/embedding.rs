//! Embedding generation with a bounded LRU cache.
//!
//! The [`Embedder`] batches chunk text through a provider, deduplicates by
//! content hash (within a call and across calls via the cache), preserves
//! input order under mixed hit/miss batches, and fails batches atomically
//! with bounded retries.

pub mod providers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio_util::sync::CancellationToken;

use crate::config::EmbeddingConfig;
use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::SimilarityMode;
use crate::hashing;

/// Similarity between two vectors under the configured mode.
pub fn similarity(a: &[f32], b: &[f32], mode: SimilarityMode) -> f32 {
    match mode {
        SimilarityMode::Dot => dot(a, b),
        SimilarityMode::Cosine => {
            let (na, nb) = (norm(a), norm(b));
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot(a, b) / (na * nb)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2-normalise in place; zero vectors are left untouched.
pub fn l2_normalise(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

/// Provider-backed embedder with content-hash LRU caching.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Arc<Vec<f32>>>,
    /// Optional persistent overflow for the LRU: one JSON vector per hash.
    disk_dir: Option<std::path::PathBuf>,
    batch_size: usize,
    normalise: bool,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            cache: Cache::builder().max_capacity(config.cache_size).build(),
            disk_dir: None,
            batch_size: config.batch_size.max(1),
            normalise: config.normalised,
        }
    }

    /// Enable the persistent overflow cache beneath `dir`.
    pub fn with_disk_cache(mut self, dir: std::path::PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create embedding cache dir");
            return self;
        }
        self.disk_dir = Some(dir);
        self
    }

    /// Disk lookup for a hash not held in memory; best effort.
    fn disk_get(&self, hash: &str) -> Option<Vec<f32>> {
        let dir = self.disk_dir.as_ref()?;
        let text = std::fs::read_to_string(dir.join(format!("{hash}.json"))).ok()?;
        let vector: Vec<f32> = serde_json::from_str(&text).ok()?;
        if vector.len() == self.dimensions() {
            Some(vector)
        } else {
            None
        }
    }

    /// Persist a computed vector to the overflow cache; best effort.
    fn disk_put(&self, hash: &str, vector: &[f32]) {
        let Some(dir) = self.disk_dir.as_ref() else {
            return;
        };
        match serde_json::to_string(vector) {
            Ok(text) => {
                if let Err(e) = std::fs::write(dir.join(format!("{hash}.json")), text) {
                    tracing::debug!(hash, error = %e, "failed to write embedding overflow entry");
                }
            }
            Err(e) => tracing::debug!(hash, error = %e, "failed to serialise embedding"),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Embed `(content_hash, text)` pairs, returning vectors in input order.
    ///
    /// Equal hashes are embedded at most once: duplicate slots share the same
    /// computed vector, and the cache short-circuits repeats across calls.
    /// A provider failure fails the whole call; no partial results escape.
    pub async fn embed_hashed(
        &self,
        items: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; items.len()];

        // Cache pass; misses are deduplicated by hash, preserving first-seen
        // order so output order survives mixed hit/miss batches.
        let mut miss_order: Vec<&str> = Vec::new();
        let mut miss_text: HashMap<&str, &str> = HashMap::new();
        let mut miss_slots: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, (hash, text)) in items.iter().enumerate() {
            if let Some(vector) = self.cache.get(hash).await {
                out[i] = Some((*vector).clone());
                continue;
            }
            if let Some(vector) = self.disk_get(hash) {
                let shared = Arc::new(vector);
                self.cache.insert(hash.clone(), Arc::clone(&shared)).await;
                out[i] = Some((*shared).clone());
                continue;
            }
            if !miss_slots.contains_key(hash.as_str()) {
                miss_order.push(hash);
                miss_text.insert(hash, text);
            }
            miss_slots.entry(hash).or_default().push(i);
        }

        for batch in miss_order.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let texts: Vec<String> = batch
                .iter()
                .map(|h| miss_text[h].to_string())
                .collect();
            let embeddings = self.embed_with_retry(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (hash, embedding) in batch.iter().zip(embeddings) {
                let mut vector = embedding.vector;
                if vector.len() != self.dimensions() {
                    return Err(Error::embedding(format!(
                        "dimension mismatch: got {}, expected {}",
                        vector.len(),
                        self.dimensions()
                    )));
                }
                if self.normalise {
                    l2_normalise(&mut vector);
                }
                let shared = Arc::new(vector);
                self.disk_put(hash, &shared);
                self.cache.insert(hash.to_string(), Arc::clone(&shared)).await;
                for &slot in &miss_slots[hash] {
                    out[slot] = Some((*shared).clone());
                }
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let hash = hashing::content_hash(text);
        let mut vectors = self
            .embed_hashed(&[(hash, text.to_string())], cancel)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding("no embedding returned for query"))
    }

    /// Bounded exponential-backoff retry around one provider batch.
    async fn embed_with_retry(
        &self,
        texts: &[String],
    ) -> Result<Vec<crate::domain::types::Embedding>> {
        let mut attempt = 0u32;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    attempt += 1;
                    if attempt >= constants::EMBEDDING_MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let delay = Duration::from_millis(
                        constants::EMBEDDING_BASE_DELAY_MS * (1 << (attempt - 1)),
                    );
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Cache entry count, for stats.
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}
