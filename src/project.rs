//! ProjectIndex: the virtual root owning configuration and all stores.
//!
//! Single-writer: indexing operations take a lock file with stale-lock
//! takeover; readers run concurrently through the store pool. Lifecycle:
//! `initialize` writes the config document, `open` loads an existing index
//! (running store recovery when needed), `reset` removes the state
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::chunking::ParserRegistry;
use crate::config::ProjectConfig;
use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::types::{
    ChangeKind, FileOutcome, IndexReport, ProjectIndexStats, SearchResult,
};
use crate::embedding::{providers, Embedder};
use crate::indexing::{Indexer, IndexProgress, TracingProgress};
use crate::metadata::MetadataManager;
use crate::relationships::RelationshipStore;
use crate::search::{ImpactReport, SearchEngine, SearchOptions};
use crate::store::recovery::{open_with_recovery, RecoveryPolicy};
use crate::store::{FilesystemStoreConfig, MetadataFilter, StorePool, StorePoolConfig};

/// Run a future against a deadline, mapping expiry to `DeadlineExceeded`.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded),
    }
}

/// Lock file guarding single-writer indexing, with stale-lock takeover.
struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(constants::INDEX_LOCK_FILE);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let stale = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|modified| {
                        SystemTime::now()
                            .duration_since(modified)
                            .map(|age| age.as_secs() > constants::INDEX_LOCK_STALE_SECS)
                            .unwrap_or(false)
                    })
                    .unwrap_or(true);
                if stale {
                    tracing::warn!(path = %path.display(), "stale index lock detected, taking over");
                    let _ = std::fs::remove_file(&path);
                    std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&path)?;
                    return Ok(Self { path });
                }
                Err(Error::internal("another indexing operation is in progress"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct ProjectIndex {
    config: Arc<ProjectConfig>,
    pool: Arc<StorePool>,
    metadata: Arc<MetadataManager>,
    indexer: Indexer,
    search: SearchEngine,
}

impl ProjectIndex {
    /// Create a new index: validates and persists the config document, then
    /// opens the freshly laid-out state directory.
    pub async fn initialize(config: ProjectConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.state_dir())?;
        std::fs::create_dir_all(config.embedding_cache_dir())?;
        config.save(&config.config_path())?;
        Self::assemble(config).await
    }

    /// Open an existing index from its project root.
    ///
    /// Store recovery runs here when corruption is detected; if the backend
    /// had to be cleared, all files known to the Metadata Manager are
    /// re-added before the call returns.
    pub async fn open(project_root: &Path) -> Result<Self> {
        let config_path = project_root
            .join(constants::STATE_DIR_NAME)
            .join(constants::CONFIG_FILE);
        let config = ProjectConfig::load(&config_path)?;
        Self::assemble(config).await
    }

    async fn assemble(config: ProjectConfig) -> Result<Self> {
        Self::assemble_with_progress(config, Arc::new(TracingProgress)).await
    }

    /// Wire the component graph; `progress` receives indexing callbacks.
    pub async fn assemble_with_progress(
        config: ProjectConfig,
        progress: Arc<dyn IndexProgress>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let provider = providers::build_provider(&config.embedding)?;
        if provider.dimensions() != config.embedding.dimensions {
            return Err(Error::config(format!(
                "provider {} emits {} dimensions but config declares {}",
                provider.provider_name(),
                provider.dimensions(),
                config.embedding.dimensions
            )));
        }
        let embedder = Arc::new(
            Embedder::new(provider, &config.embedding)
                .with_disk_cache(config.embedding_cache_dir()),
        );

        let outcome = open_with_recovery(
            FilesystemStoreConfig {
                base_dir: config.vectors_dir(),
                dimensions: config.embedding.dimensions,
                similarity: config.embedding.similarity_mode(),
            },
            &RecoveryPolicy::default(),
        )
        .await?;
        let needs_rebuild = outcome.needs_rebuild();
        let pool = Arc::new(StorePool::new(
            Arc::new(outcome.into_store()),
            StorePoolConfig {
                read_concurrency: config.effective_read_concurrency(),
                lease_timeout: Duration::from_millis(constants::DEFAULT_LEASE_TIMEOUT_MS),
            },
        ));

        let metadata = Arc::new(MetadataManager::load(config.metadata_path()));
        let relationships = Arc::new(RelationshipStore::load(config.relationships_path()));
        let registry = Arc::new(ParserRegistry::new(&config.chunking));

        let indexer = Indexer::new(
            Arc::clone(&config),
            registry,
            Arc::clone(&embedder),
            Arc::clone(&pool),
            Arc::clone(&metadata),
            Arc::clone(&relationships),
            progress,
        )?;
        let search = SearchEngine::new(
            Arc::clone(&config),
            embedder,
            Arc::clone(&pool),
            relationships,
            Arc::clone(&metadata),
        );

        let index = Self {
            config,
            pool,
            metadata,
            indexer,
            search,
        };
        if needs_rebuild {
            tracing::warn!("store was cleared during recovery, rebuilding from metadata");
            index
                .indexer
                .rebuild_from_metadata(&CancellationToken::new())
                .await?;
        }
        Ok(index)
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Full traversal; `force` bypasses the change-detection gatekeeper.
    pub async fn index_project(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let _lock = IndexLock::acquire(&self.config.state_dir())?;
        match self.indexer.index_project(force, cancel).await {
            Err(e) if e.is_corruption() => {
                self.recover(cancel).await?;
                self.indexer.index_project(force, cancel).await
            }
            other => other,
        }
    }

    /// Re-index one file (e.g. after a watcher event).
    pub async fn index_path(&self, path: &Path, cancel: &CancellationToken) -> Result<FileOutcome> {
        let _lock = IndexLock::acquire(&self.config.state_dir())?;
        self.indexer.index_path(path, cancel).await
    }

    /// Remove a file's chunks and bookkeeping.
    pub async fn remove_path(&self, path: &Path) -> Result<usize> {
        let _lock = IndexLock::acquire(&self.config.state_dir())?;
        self.indexer.remove_path(path).await
    }

    /// Change notification hook for external file watchers.
    pub async fn on_change(
        &self,
        path: &Path,
        kind: ChangeKind,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        match kind {
            ChangeKind::Removed => {
                self.remove_path(path).await?;
                Ok(FileOutcome::Skipped {
                    reason: crate::domain::types::SkipReason::Filtered,
                })
            }
            ChangeKind::Created | ChangeKind::Modified => self.index_path(path, cancel).await,
        }
    }

    /// Background job: record `semantically_similar` edges.
    pub async fn compute_semantic_links(
        &self,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.indexer.compute_semantic_links(top_k, cancel).await
    }

    /// Semantic search; store corruption triggers recovery and one retry.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        match self.search.search(query, k, filter, options, cancel).await {
            Err(e) if e.is_corruption() => {
                tracing::warn!(error = %e, "query hit store corruption, recovering");
                self.recover(cancel).await?;
                self.search.search(query, k, filter, options, cancel).await
            }
            other => other,
        }
    }

    /// Chunks similar to an existing chunk, excluding itself.
    pub async fn search_similar(
        &self,
        chunk_id: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        self.search.search_similar(chunk_id, k, cancel).await
    }

    /// Transitive callers and importers of a symbol.
    pub async fn analyze_impact(&self, symbol: &str, max_depth: usize) -> Result<ImpactReport> {
        self.search.analyze_impact(symbol, max_depth).await
    }

    /// Non-trivial cycles in the file import graph.
    pub async fn check_circular_dependencies(&self) -> Result<Vec<Vec<String>>> {
        self.search.check_circular_dependencies().await
    }

    /// Status snapshot: file/chunk counts, language breakdown, store stats.
    pub async fn get_status(&self) -> Result<ProjectIndexStats> {
        let cancel = CancellationToken::new();
        let records = self.metadata.all_records().await;
        let mut languages: BTreeMap<String, u64> = BTreeMap::new();
        let mut total_chunks = 0u64;
        let mut last_indexed_at = None;
        for record in &records {
            *languages.entry(record.language.to_string()).or_insert(0) += 1;
            total_chunks += record.chunk_ids.len() as u64;
            if last_indexed_at.map(|t| record.indexed_at > t).unwrap_or(true) {
                last_indexed_at = Some(record.indexed_at);
            }
        }
        let store = {
            let lease = self.pool.read(&cancel).await?;
            lease.store().stats().await?
        };
        Ok(ProjectIndexStats {
            total_files: records.len() as u64,
            total_chunks,
            languages,
            store,
            last_indexed_at,
        })
    }

    /// Destroy the index: removes the state directory entirely.
    pub async fn reset(self) -> Result<()> {
        let state_dir = self.config.state_dir();
        drop(self);
        if state_dir.exists() {
            std::fs::remove_dir_all(&state_dir)?;
        }
        tracing::info!(path = %state_dir.display(), "index reset");
        Ok(())
    }

    /// Run the store recovery protocol and swap the rebuilt backend in.
    async fn recover(&self, cancel: &CancellationToken) -> Result<()> {
        let outcome = open_with_recovery(
            FilesystemStoreConfig {
                base_dir: self.config.vectors_dir(),
                dimensions: self.config.embedding.dimensions,
                similarity: self.config.embedding.similarity_mode(),
            },
            &RecoveryPolicy::default(),
        )
        .await?;
        let needs_rebuild = outcome.needs_rebuild();
        self.pool
            .replace_store(Arc::new(outcome.into_store()))
            .await;
        if needs_rebuild {
            self.indexer.rebuild_from_metadata(cancel).await?;
        }
        Ok(())
    }
}
