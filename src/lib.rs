//! Local, incremental code-intelligence engine.
//!
//! Ingests a source tree, produces structural code chunks with semantic
//! embeddings, and answers similarity queries over them without
//! re-processing unchanged inputs. External surfaces (CLI, tool servers,
//! watchers) are thin adapters over [`project::ProjectIndex`].

pub mod chunking;
pub mod config;
pub mod constants;
pub mod domain;
pub mod embedding;
pub mod hashing;
pub mod indexing;
pub mod metadata;
pub mod project;
pub mod relationships;
pub mod scanner;
pub mod search;
pub mod store;

pub use config::{EmbeddingConfig, ProjectConfig, ScoringConfig};
pub use domain::error::{Error, Result};
pub use domain::types::{
    ChangeKind, ChunkKind, CodeChunk, FileOutcome, FileRecord, Grade, IndexReport, Language,
    ProjectIndexStats, RelationKind, Relationship, SearchResult, SkipReason,
};
pub use indexing::{IndexProgress, NullProgress, TracingProgress};
pub use project::ProjectIndex;
pub use search::{ImpactReport, SearchEngine, SearchOptions};
pub use store::MetadataFilter;
