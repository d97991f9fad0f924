//! Progress reporting for indexing runs.

use crate::domain::error::Error;
use crate::domain::types::FileOutcome;

/// Callback interface driven by the Indexer as files move through the
/// pipeline. Implementations must be cheap; they run on worker tasks.
pub trait IndexProgress: Send + Sync {
    fn on_file_started(&self, _path: &str) {}
    fn on_file_finished(&self, _path: &str, _outcome: &FileOutcome) {}
    fn on_error(&self, _path: &str, _error: &Error) {}
}

/// Discards all events.
#[derive(Default)]
pub struct NullProgress;

impl IndexProgress for NullProgress {}

/// Reports progress through `tracing`.
#[derive(Default)]
pub struct TracingProgress;

impl IndexProgress for TracingProgress {
    fn on_file_started(&self, path: &str) {
        tracing::debug!(path, "indexing file");
    }

    fn on_file_finished(&self, path: &str, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Indexed {
                added,
                updated,
                deleted,
            } => {
                tracing::info!(path, added, updated, deleted, "file indexed");
            }
            FileOutcome::Skipped { .. } => tracing::debug!(path, "file skipped"),
            FileOutcome::Failed { message } => {
                tracing::warn!(path, message = %message, "file failed");
            }
        }
    }

    fn on_error(&self, path: &str, error: &Error) {
        tracing::error!(path, error = %error, "indexing error");
    }
}
