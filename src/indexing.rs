//! Indexing pipeline: orchestration, prioritisation, progress reporting.

pub mod indexer;
pub mod priority;
pub mod progress;

pub use indexer::Indexer;
pub use progress::{IndexProgress, NullProgress, TracingProgress};
