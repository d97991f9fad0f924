//! Provider ports.
//!
//! Trait seams between the pipeline and its pluggable backends. The embedder
//! and the vector store are the two components with real provider diversity;
//! everything else in the crate is concrete.

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::types::{CodeChunk, Embedding, ScoredChunk, StoreStats, VectorRecord};
use crate::store::filter::MetadataFilter;

/// A model that turns text into fixed-dimension vectors.
///
/// Implementations must be re-entrant; batching and caching are layered on
/// top by [`crate::embedding::Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| crate::domain::error::Error::embedding("no embedding returned"))
    }

    /// Embed a batch of texts. Output order matches input order; a failure
    /// fails the whole batch.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Fixed output dimensionality of this provider/model pair.
    fn dimensions(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Persistent storage of `{id, vector, chunk}` tuples with filtered k-NN.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records; idempotent by id.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Delete by id; unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Nearest-neighbour query with the metadata filter applied at the store
    /// level, ordered by decreasing score.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Fetch chunk metadata for enrichment; missing ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<CodeChunk>>;

    /// Fetch stored vectors by id; missing ids are skipped.
    async fn get_vectors(&self, ids: &[String]) -> Result<Vec<(String, Vec<f32>)>>;

    /// Ids of all chunks tagged with the given project-relative path.
    async fn ids_for_path(&self, path: &str) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Persist any buffered state.
    async fn flush(&self) -> Result<()>;

    fn provider_name(&self) -> &str;
}
