//! Vector store corruption recovery.
//!
//! Protocol: (1) try to open normally; (2) on corruption, salvage whatever
//! entries are still readable into a rebuilt store; (3) if nothing is
//! salvageable, clear the backend and report that a rebuild from the
//! Metadata Manager's known paths is required. Attempts are bounded by an
//! exponential backoff; exhaustion surfaces `StoreUnavailable`.

use std::time::Duration;

use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::ports::VectorStore;
use crate::store::filesystem::{FilesystemStoreConfig, FilesystemVectorStore};

#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::RECOVERY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(constants::RECOVERY_BASE_DELAY_MS),
        }
    }
}

/// What recovery managed to do.
pub enum RecoveryOutcome {
    /// Store opened cleanly; nothing was wrong.
    Healthy(FilesystemVectorStore),
    /// Store was rebuilt from salvaged entries; contents are intact.
    Recovered(FilesystemVectorStore),
    /// Store was cleared; the caller must re-add all files known to the
    /// Metadata Manager.
    RebuildRequired(FilesystemVectorStore),
}

impl RecoveryOutcome {
    pub fn into_store(self) -> FilesystemVectorStore {
        match self {
            RecoveryOutcome::Healthy(s)
            | RecoveryOutcome::Recovered(s)
            | RecoveryOutcome::RebuildRequired(s) => s,
        }
    }

    pub fn needs_rebuild(&self) -> bool {
        matches!(self, RecoveryOutcome::RebuildRequired(_))
    }
}

/// Open the filesystem store, running the recovery protocol on corruption.
pub async fn open_with_recovery(
    config: FilesystemStoreConfig,
    policy: &RecoveryPolicy,
) -> Result<RecoveryOutcome> {
    let mut last_error = String::new();
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.base_delay * 2u32.pow(attempt - 1);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "recovery backoff");
            tokio::time::sleep(delay).await;
        }

        match FilesystemVectorStore::open(config.clone()) {
            Ok(store) => {
                if attempt == 0 {
                    return Ok(RecoveryOutcome::Healthy(store));
                }
                return Ok(RecoveryOutcome::Recovered(store));
            }
            Err(e) if e.is_corruption() => {
                tracing::warn!(error = %e, attempt, "store corruption detected, attempting recovery");
                last_error = e.to_string();
                match rebuild(&config).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(rebuild_err) => {
                        tracing::warn!(error = %rebuild_err, "recovery attempt failed");
                        last_error = rebuild_err.to_string();
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::StoreUnavailable {
        message: last_error,
        attempts: policy.max_attempts,
    })
}

/// Salvage readable entries, move the corrupt state aside, and rebuild.
async fn rebuild(config: &FilesystemStoreConfig) -> Result<RecoveryOutcome> {
    let salvaged = FilesystemVectorStore::salvage_entries(&config.base_dir, config.dimensions);
    tracing::info!(entries = salvaged.len(), "salvage pass complete");

    // Keep the corrupt state around for post-mortem rather than deleting it.
    let backup = config
        .base_dir
        .with_extension(format!("corrupt.{}", chrono::Utc::now().timestamp()));
    if config.base_dir.exists() {
        std::fs::rename(&config.base_dir, &backup)
            .map_err(|e| Error::store(format!("cannot move corrupt store aside: {e}")))?;
        tracing::info!(backup = %backup.display(), "corrupt store moved aside");
    }

    let store = FilesystemVectorStore::open(config.clone())?;
    if salvaged.is_empty() {
        return Ok(RecoveryOutcome::RebuildRequired(store));
    }
    store.add(salvaged).await?;
    Ok(RecoveryOutcome::Recovered(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkKind, CodeChunk, Language, SimilarityMode, VectorRecord};
    use crate::store::filter::MetadataFilter;

    fn config(dir: &std::path::Path) -> FilesystemStoreConfig {
        FilesystemStoreConfig {
            base_dir: dir.join("vectors"),
            dimensions: 3,
            similarity: SimilarityMode::Cosine,
        }
    }

    fn record(seed: u32) -> VectorRecord {
        let chunk = CodeChunk::new(
            "a.py",
            seed,
            seed + 1,
            ChunkKind::Function,
            format!("f{seed}"),
            Language::Python,
            format!("def f{seed}(): pass"),
        );
        VectorRecord {
            id: chunk.id.clone(),
            vector: vec![seed as f32, 1.0, 0.0],
            chunk,
        }
    }

    #[tokio::test]
    async fn healthy_store_opens_without_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = open_with_recovery(config(dir.path()), &RecoveryPolicy::default())
            .await
            .unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Healthy(_)));
    }

    #[tokio::test]
    async fn checksum_corruption_recovers_with_salvaged_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        {
            let store = FilesystemVectorStore::open(cfg.clone()).unwrap();
            store.add(vec![record(1), record(2)]).await.unwrap();
        }
        // Corrupt the checksum only; entries stay parseable.
        let index = cfg.base_dir.join("index.json");
        let text = std::fs::read_to_string(&index)
            .unwrap()
            .replacen("\"checksum\":\"", "\"checksum\":\"ff", 1);
        std::fs::write(&index, text).unwrap();

        let outcome = open_with_recovery(cfg, &RecoveryPolicy::default())
            .await
            .unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Recovered(_)));
        let store = outcome.into_store();
        assert_eq!(store.count().await.unwrap(), 2);
        // Queries return the same content as before the corruption.
        let results = store
            .query(&[1.0, 1.0, 0.0], 2, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn unparseable_index_requires_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        {
            let store = FilesystemVectorStore::open(cfg.clone()).unwrap();
            store.add(vec![record(1)]).await.unwrap();
        }
        std::fs::write(cfg.base_dir.join("index.json"), b"\x00garbage").unwrap();

        let outcome = open_with_recovery(cfg, &RecoveryPolicy::default())
            .await
            .unwrap();
        assert!(outcome.needs_rebuild());
        assert_eq!(outcome.into_store().count().await.unwrap(), 0);
    }
}
