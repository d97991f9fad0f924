//! Vector store backends, filtering, pooling and recovery.

pub mod filesystem;
pub mod filter;
pub mod memory;
pub mod pool;
pub mod recovery;

pub use filesystem::{FilesystemStoreConfig, FilesystemVectorStore};
pub use filter::MetadataFilter;
pub use memory::MemoryVectorStore;
pub use pool::{StorePool, StorePoolConfig};

use crate::domain::types::ScoredChunk;

/// Sort by descending score with ascending-id tie-break, truncate to `k`.
///
/// The tie-break keeps result ordering deterministic across runs and
/// backends.
pub fn rank_top_k(scored: impl Iterator<Item = ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    let mut results: Vec<ScoredChunk> = scored.collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(k);
    results
}
