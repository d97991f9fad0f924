//! Project configuration.
//!
//! An immutable [`ProjectConfig`] record is constructed once per
//! [`crate::project::ProjectIndex`] and borrowed by every component. It
//! round-trips through `config.json` in the state directory with atomic
//! write-to-temp + rename semantics.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::types::SimilarityMode;

/// Embedding model and batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider selector: "hash", "ollama" or "fastembed".
    pub provider: String,
    /// Opaque model identifier; changing it requires a full reindex.
    pub model: String,
    /// Base URL for HTTP providers.
    pub base_url: Option<String>,
    /// Fixed output dimensionality.
    pub dimensions: usize,
    /// Whether the model emits normalised vectors (bge, jina-v3 families).
    /// Must match the model; decides dot-product vs cosine similarity.
    pub normalised: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,
}

fn default_batch_size() -> usize {
    constants::DEFAULT_BATCH_SIZE
}

fn default_cache_size() -> u64 {
    constants::DEFAULT_EMBEDDING_CACHE_SIZE
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: "bge-small-en-v1.5".to_string(),
            base_url: None,
            dimensions: 384,
            normalised: true,
            batch_size: default_batch_size(),
            cache_size: default_cache_size(),
        }
    }
}

impl EmbeddingConfig {
    /// Similarity function implied by the model designation.
    pub fn similarity_mode(&self) -> SimilarityMode {
        if self.normalised {
            SimilarityMode::Dot
        } else {
            SimilarityMode::Cosine
        }
    }
}

/// Model families known to emit L2-normalised embeddings.
pub fn is_normalised_model(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("bge") || lower.contains("jina")
}

/// Text-mode chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Lines per plain-text window.
    pub chunk_size: usize,
    /// Overlap lines between consecutive windows.
    pub chunk_overlap: usize,
    /// Parser safety cap in bytes; longer chunk content is truncated.
    pub max_chunk_size: usize,
    /// Sections shorter than this merge into their neighbour.
    pub min_section_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::TEXT_CHUNK_LINES,
            chunk_overlap: constants::TEXT_CHUNK_OVERLAP,
            max_chunk_size: constants::DEFAULT_MAX_CHUNK_SIZE,
            min_section_chars: constants::MIN_SECTION_CHARS,
        }
    }
}

/// Re-rank weight configuration.
///
/// `score = w_v * similarity + w_q * quality + w_s * structural - w_b * boilerplate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    pub vector_weight: f32,
    pub quality_weight: f32,
    pub structural_weight: f32,
    pub boilerplate_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            quality_weight: 0.15,
            structural_weight: 0.1,
            boilerplate_weight: 0.25,
        }
    }
}

/// Background auto-index knobs (consumed by external scheduler adapters).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoIndexConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
}

impl Default for AutoIndexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_secs: 300,
        }
    }
}

/// Immutable per-project configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project root the index covers.
    pub project_root: PathBuf,
    /// Extensions (without dot) the path filter admits.
    pub file_extensions: BTreeSet<String>,
    /// Exclude glob patterns; directory patterns end in `/`.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default = "default_true")]
    pub skip_dotfiles: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub auto_index: AutoIndexConfig,
    /// Default similarity threshold floor for search.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Store pool: shared read leases.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Concurrent reads admitted by the pool; defaults to `pool_size`.
    #[serde(default)]
    pub read_concurrency: Option<usize>,
    /// Upper bound on indexing workers; effective count is
    /// `min(cores, max_workers)`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    constants::MAX_FILE_SIZE_BYTES
}

fn default_similarity_threshold() -> f32 {
    constants::DEFAULT_SIMILARITY_THRESHOLD
}

fn default_pool_size() -> usize {
    constants::DEFAULT_POOL_SIZE
}

fn default_max_workers() -> usize {
    8
}

impl ProjectConfig {
    /// Configuration with sensible defaults for a project root.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            file_extensions: default_extensions(),
            exclude_patterns: Vec::new(),
            respect_gitignore: true,
            skip_dotfiles: true,
            max_file_size_bytes: default_max_file_size(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            scoring: ScoringConfig::default(),
            auto_index: AutoIndexConfig::default(),
            similarity_threshold: default_similarity_threshold(),
            pool_size: default_pool_size(),
            read_concurrency: None,
            max_workers: default_max_workers(),
        }
    }

    /// State directory beneath the project root.
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(constants::STATE_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join(constants::CONFIG_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.state_dir().join(constants::METADATA_FILE)
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.state_dir().join(constants::VECTORS_DIR)
    }

    pub fn relationships_path(&self) -> PathBuf {
        self.state_dir().join(constants::RELATIONSHIPS_FILE)
    }

    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.state_dir().join(constants::EMBEDDING_CACHE_DIR)
    }

    pub fn effective_read_concurrency(&self) -> usize {
        self.read_concurrency.unwrap_or(self.pool_size).max(1)
    }

    /// Effective indexing worker count.
    pub fn effective_workers(&self) -> usize {
        num_cpus::get().min(self.max_workers).max(1)
    }

    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.file_extensions.is_empty() {
            return Err(Error::config("file_extensions must not be empty"));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::config("embedding.dimensions must be positive"));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::config("embedding.batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::config(
                "similarity_threshold must be within [0.0, 1.0]",
            ));
        }
        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be positive"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::config(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            ));
        }
        if self.embedding.normalised != is_normalised_model(&self.embedding.model)
            && self.embedding.provider != "hash"
        {
            tracing::warn!(
                model = %self.embedding.model,
                normalised = self.embedding.normalised,
                "embedding.normalised does not match the model family designation"
            );
        }
        for w in [
            self.scoring.vector_weight,
            self.scoring.quality_weight,
            self.scoring.structural_weight,
            self.scoring.boilerplate_weight,
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::config("scoring weights must be within [0.0, 1.0]"));
            }
        }
        Ok(())
    }

    /// Load and validate a config document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: ProjectConfig = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("invalid config document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist atomically: write to a temp file in the same directory, then
    /// rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::config("config path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .map_err(|e| Error::config(format!("cannot persist config: {e}")))?;
        Ok(())
    }

    /// Changes that invalidate existing vectors and force a full reindex.
    pub fn requires_reindex(&self, other: &ProjectConfig) -> bool {
        self.embedding.model != other.embedding.model
            || self.embedding.dimensions != other.embedding.dimensions
            || self.embedding.normalised != other.embedding.normalised
    }
}

fn default_extensions() -> BTreeSet<String> {
    [
        "py", "js", "jsx", "ts", "tsx", "dart", "php", "rb", "html", "md", "txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
