//! Project-wide constants and tunables.
//!
//! Magic numbers used across the pipeline live here so they can be audited in
//! one place. Values that users are expected to change are mirrored in
//! [`crate::config::ProjectConfig`]; these are the built-in defaults.

/// Name of the per-project state directory created beneath the project root.
pub const STATE_DIR_NAME: &str = ".code-intelligence";

/// Config document file name inside the state directory.
pub const CONFIG_FILE: &str = "config.json";

/// Metadata Manager document file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Relationship store document file name.
pub const RELATIONSHIPS_FILE: &str = "relationships.db";

/// Vector store backend directory (opaque, owned by the store).
pub const VECTORS_DIR: &str = "vectors";

/// Overflow directory for the persistent embedding cache.
pub const EMBEDDING_CACHE_DIR: &str = "cache/embeddings";

/// Lock file guarding single-writer indexing.
pub const INDEX_LOCK_FILE: &str = "index.lock";

/// A lock older than this is considered stale and taken over.
pub const INDEX_LOCK_STALE_SECS: u64 = 600;

/// Maximum file size admitted by the path filter (2 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024;

/// Bytes sniffed from the head of a file for binary / minified detection.
pub const SNIFF_BYTES: usize = 8192;

/// Dot-directories admitted even when `skip_dotfiles` is enabled.
pub const WHITELISTED_DOT_DIRS: &[&str] = &[".github", ".gitlab-ci", ".circleci"];

/// Default embedding batch size.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default bounded size of the embedding LRU cache.
pub const DEFAULT_EMBEDDING_CACHE_SIZE: u64 = 10_000;

/// Default similarity threshold floor for search.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Ceiling for the adaptive threshold drop.
pub const MAX_ADAPTIVE_DROP: f32 = 0.2;

/// Similarity floor for recording `semantically_similar` edges.
pub const SEMANTIC_LINK_FLOOR: f32 = 0.75;

/// Default store connection pool size (shared read leases).
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default lease acquisition timeout in milliseconds.
pub const DEFAULT_LEASE_TIMEOUT_MS: u64 = 30_000;

/// Store recovery: maximum attempts before surfacing `StoreUnavailable`.
pub const RECOVERY_MAX_ATTEMPTS: u32 = 3;

/// Store recovery: base backoff delay in milliseconds (doubled per attempt).
pub const RECOVERY_BASE_DELAY_MS: u64 = 200;

/// Embedding failures: retry attempts before failing the file.
pub const EMBEDDING_MAX_ATTEMPTS: u32 = 3;

/// Embedding failures: base backoff delay in milliseconds.
pub const EMBEDDING_BASE_DELAY_MS: u64 = 100;

/// Text / markdown: lines per plain-text chunk window.
pub const TEXT_CHUNK_LINES: usize = 30;

/// Text / markdown: overlap lines between consecutive windows.
pub const TEXT_CHUNK_OVERLAP: usize = 4;

/// Sections shorter than this many characters are merged into a neighbour.
pub const MIN_SECTION_CHARS: usize = 80;

/// Parser safety cap: chunk content longer than this is truncated at emit.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 16_384;

/// Metadata is persisted after this many files during a long indexing run.
pub const METADATA_FLUSH_INTERVAL: usize = 64;

/// Smell threshold: Long Method LOC.
pub const LONG_METHOD_LOC: u32 = 50;

/// Smell threshold: God Class LOC.
pub const GOD_CLASS_LOC: u32 = 250;

/// Smell threshold: God Class method count.
pub const GOD_CLASS_METHODS: u32 = 20;

/// Smell threshold: Deep Nesting depth.
pub const DEEP_NESTING_DEPTH: u32 = 4;

/// Smell threshold: High Complexity (cyclomatic).
pub const HIGH_COMPLEXITY_CYCLOMATIC: u32 = 15;

/// Smell threshold: Long Parameter List.
pub const LONG_PARAMETER_LIST: u32 = 5;

/// Search over-fetch: `k' = min(k * OVERFETCH_FACTOR, OVERFETCH_CAP)`.
pub const OVERFETCH_FACTOR: usize = 4;

/// Search over-fetch ceiling.
pub const OVERFETCH_CAP: usize = 100;

/// Maximum results returned per file after re-ranking.
pub const MAX_RESULTS_PER_FILE: usize = 3;

/// Bounded query-history entries kept for adaptive thresholding.
pub const QUERY_HISTORY_CAPACITY: usize = 256;

/// Default depth limit for impact analysis traversal.
pub const IMPACT_MAX_DEPTH: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_never_exceeds_the_cap() {
        let k = 40;
        assert!((k * OVERFETCH_FACTOR).min(OVERFETCH_CAP) <= OVERFETCH_CAP);
    }

    #[test]
    fn adaptive_drop_stays_below_the_default_threshold_band() {
        // The drop ceiling must leave room under the default floor, or every
        // short query would collapse the threshold to zero.
        assert!(MAX_ADAPTIVE_DROP < DEFAULT_SIMILARITY_THRESHOLD + f32::EPSILON);
    }

    #[test]
    fn ci_dot_dirs_are_whitelisted() {
        assert!(WHITELISTED_DOT_DIRS.contains(&".github"));
        assert_eq!(WHITELISTED_DOT_DIRS.len(), 3);
    }
}
