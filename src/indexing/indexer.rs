//! The Indexer drives the pipeline and owns the incremental-update protocol.
//!
//! Per-file protocol: hash gate → parse → chunk diff → embed unique hashes →
//! store add/delete under the write lease → metadata record written last.
//! Per-file failures are isolated; store write failures halt the run so the
//! recovery protocol can take over.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::chunking::ParserRegistry;
use crate::config::ProjectConfig;
use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::types::{
    FileOutcome, FileRecord, IndexReport, Language, Relationship, RelationKind, SkipReason,
    VectorRecord,
};
use crate::embedding::Embedder;
use crate::hashing;
use crate::indexing::priority;
use crate::indexing::progress::IndexProgress;
use crate::metadata::MetadataManager;
use crate::relationships::RelationshipStore;
use crate::scanner::{decode_text, PathFilter};
use crate::store::StorePool;

pub struct Indexer {
    config: Arc<ProjectConfig>,
    filter: Arc<PathFilter>,
    registry: Arc<ParserRegistry>,
    embedder: Arc<Embedder>,
    pool: Arc<StorePool>,
    metadata: Arc<MetadataManager>,
    relationships: Arc<RelationshipStore>,
    progress: Arc<dyn IndexProgress>,
}

impl Indexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ProjectConfig>,
        registry: Arc<ParserRegistry>,
        embedder: Arc<Embedder>,
        pool: Arc<StorePool>,
        metadata: Arc<MetadataManager>,
        relationships: Arc<RelationshipStore>,
        progress: Arc<dyn IndexProgress>,
    ) -> Result<Self> {
        let filter = Arc::new(PathFilter::new(Arc::clone(&config))?);
        Ok(Self {
            config,
            filter,
            registry,
            embedder,
            pool,
            metadata,
            relationships,
            progress,
        })
    }

    /// Full traversal. With `force`, the hash gatekeeper is bypassed and
    /// every discovered file is re-processed.
    pub async fn index_project(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        let filter = Arc::clone(&self.filter);
        let discovered = tokio::task::spawn_blocking(move || filter.discover())
            .await
            .map_err(|e| Error::internal(format!("discovery task failed: {e}")))?;
        let pairs: Vec<(PathBuf, String)> = discovered
            .into_iter()
            .map(|p| {
                let rel = self.filter.relative(&p);
                (p, rel)
            })
            .collect();
        let current: HashSet<String> = pairs.iter().map(|(_, rel)| rel.clone()).collect();

        let mut report = IndexReport {
            files_found: pairs.len(),
            ..Default::default()
        };

        // Tracked files that no longer exist (or are newly excluded) leave
        // the index.
        for tracked in self.metadata.all_paths().await {
            if current.contains(&tracked) {
                continue;
            }
            if cancel.is_cancelled() {
                return self.finish_cancelled().await;
            }
            match self.remove_file_state(&tracked, cancel).await {
                Ok(_) => report.files_removed += 1,
                Err(e) if self.halts_run(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %tracked, error = %e, "failed to clean removed file");
                }
            }
        }

        let ordered = priority::prioritise(pairs, &self.config.project_root);
        let workers = self.config.effective_workers();
        let mut since_flush = 0usize;
        let mut changed: Vec<String> = Vec::new();

        for batch in ordered.chunks(workers) {
            if cancel.is_cancelled() {
                return self.finish_cancelled().await;
            }
            let tasks = batch.iter().map(|(abs, rel)| async move {
                self.progress.on_file_started(rel);
                let outcome = self.index_one(abs, rel, force, cancel).await;
                (rel.as_str(), outcome)
            });
            let results = futures::future::join_all(tasks).await;

            for (rel, result) in results {
                match result {
                    Ok(outcome) => {
                        self.progress.on_file_finished(rel, &outcome);
                        match &outcome {
                            FileOutcome::Indexed {
                                added,
                                updated,
                                deleted,
                            } => {
                                report.files_indexed += 1;
                                report.chunks_added += added;
                                report.chunks_updated += updated;
                                report.chunks_deleted += deleted;
                                changed.push(rel.to_string());
                            }
                            FileOutcome::Skipped { .. } => report.files_skipped += 1,
                            FileOutcome::Failed { message } => {
                                report.files_failed += 1;
                                report.failures.push((rel.to_string(), message.clone()));
                            }
                        }
                    }
                    Err(e) if e.is_cancellation() => {
                        let _ = self.metadata.save().await;
                        return Err(e);
                    }
                    Err(e) if self.halts_run(&e) => {
                        self.progress.on_error(rel, &e);
                        let _ = self.metadata.save().await;
                        return Err(e);
                    }
                    Err(e) => {
                        self.progress.on_error(rel, &e);
                        report.files_failed += 1;
                        report.failures.push((rel.to_string(), e.to_string()));
                    }
                }
            }

            since_flush += batch.len();
            if since_flush >= constants::METADATA_FLUSH_INTERVAL {
                self.metadata.save().await?;
                since_flush = 0;
            }
        }

        // Second pass: call/import edges resolve against the complete symbol
        // table, so files indexed early still link to files indexed late.
        self.link_files(&changed, &current, cancel).await;

        self.metadata.save().await?;
        self.relationships.save().await?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            found = report.files_found,
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            removed = report.files_removed,
            failed = report.files_failed,
            duration_ms = report.duration_ms,
            "index run complete"
        );
        Ok(report)
    }

    /// Re-index a single file, e.g. after a watcher event. A path that no
    /// longer exists is removed from the index instead.
    pub async fn index_path(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        let (abs, rel) = self.resolve(path);
        if !abs.exists() {
            self.remove_path(path).await?;
            return Ok(FileOutcome::Skipped {
                reason: SkipReason::Filtered,
            });
        }
        if !self.filter.admits(&abs) {
            return Ok(FileOutcome::Skipped {
                reason: SkipReason::Filtered,
            });
        }
        self.progress.on_file_started(&rel);
        let outcome = self.index_one(&abs, &rel, false, cancel).await?;
        self.progress.on_file_finished(&rel, &outcome);

        if matches!(outcome, FileOutcome::Indexed { .. }) {
            let mut known: HashSet<String> =
                self.metadata.all_paths().await.into_iter().collect();
            known.insert(rel.clone());
            self.link_files(std::slice::from_ref(&rel), &known, cancel)
                .await;
        }
        self.metadata.save().await?;
        self.relationships.save().await?;
        Ok(outcome)
    }

    /// Remove a file's chunks, relationships and FileRecord.
    pub async fn remove_path(&self, path: &Path) -> Result<usize> {
        let (_, rel) = self.resolve(path);
        let removed = self
            .remove_file_state(&rel, &CancellationToken::new())
            .await?;
        self.metadata.save().await?;
        self.relationships.save().await?;
        Ok(removed)
    }

    /// Re-add every file known to the Metadata Manager, bypassing the hash
    /// gate. Used when store recovery cleared the backend.
    pub async fn rebuild_from_metadata(&self, cancel: &CancellationToken) -> Result<IndexReport> {
        let started = Instant::now();
        let records = self.metadata.all_records().await;
        let known: HashSet<String> = records.iter().map(|r| r.path.clone()).collect();
        let mut report = IndexReport {
            files_found: records.len(),
            ..Default::default()
        };
        let mut changed = Vec::new();
        for record in records {
            if cancel.is_cancelled() {
                return self.finish_cancelled().await;
            }
            let abs = self.config.project_root.join(&record.path);
            match self.index_one(&abs, &record.path, true, cancel).await {
                Ok(FileOutcome::Indexed {
                    added,
                    updated,
                    deleted,
                }) => {
                    report.files_indexed += 1;
                    report.chunks_added += added;
                    report.chunks_updated += updated;
                    report.chunks_deleted += deleted;
                    changed.push(record.path.clone());
                }
                Ok(_) => report.files_skipped += 1,
                Err(e) if self.halts_run(&e) || e.is_cancellation() => return Err(e),
                Err(e) => {
                    report.files_failed += 1;
                    report.failures.push((record.path.clone(), e.to_string()));
                }
            }
        }
        self.link_files(&changed, &known, cancel).await;
        self.metadata.save().await?;
        self.relationships.save().await?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Optional background job: record `semantically_similar` edges for all
    /// indexed chunks above the similarity floor.
    pub async fn compute_semantic_links(
        &self,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut linked = 0usize;
        for record in self.metadata.all_records().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let lease = self.pool.read(cancel).await?;
            let vectors = lease.store().get_vectors(&record.chunk_ids).await?;
            let mut edges = Vec::new();
            for (id, vector) in vectors {
                let neighbours = lease
                    .store()
                    .query(&vector, top_k + 1, &Default::default())
                    .await?;
                for hit in neighbours {
                    if hit.id == id || hit.score < constants::SEMANTIC_LINK_FLOOR {
                        continue;
                    }
                    edges.push(Relationship {
                        source_id: id.clone(),
                        target_id: hit.id,
                        kind: RelationKind::SemanticallySimilar,
                        weight: hit.score,
                    });
                }
            }
            drop(lease);
            linked += edges.len();
            self.relationships.upsert(edges).await;
        }
        self.relationships.save().await?;
        Ok(linked)
    }

    /// The per-file pipeline. The FileRecord write is last: any earlier
    /// failure leaves the previous record in place and the next run retries.
    async fn index_one(
        &self,
        abs: &Path,
        rel: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let meta = tokio::fs::metadata(abs).await?;
        let size = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let previous = self.metadata.get(rel).await;
        if !force {
            if let Some(record) = &previous {
                // mtime+size fast path spares the read and hash entirely.
                if record.size == size && record.mtime == mtime {
                    return Ok(FileOutcome::Skipped {
                        reason: SkipReason::Unchanged,
                    });
                }
            }
        }

        // IoError policy: retry the read once before reporting.
        let bytes = match tokio::fs::read(abs).await {
            Ok(bytes) => bytes,
            Err(first) => {
                tracing::warn!(path = rel, error = %first, "read failed, retrying once");
                tokio::fs::read(abs).await?
            }
        };
        let file_hash = hashing::bytes_hash(&bytes);

        if !force {
            if let Some(record) = &previous {
                if record.file_hash == file_hash {
                    // Content identical; refresh the stat fast path only.
                    let mut refreshed = record.clone();
                    refreshed.size = size;
                    refreshed.mtime = mtime;
                    self.metadata.put(refreshed).await;
                    return Ok(FileOutcome::Skipped {
                        reason: SkipReason::Unchanged,
                    });
                }
            }
        }

        let language = abs
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown);

        let Some((text, lossy)) = decode_text(&bytes, language).into_text() else {
            tracing::debug!(path = rel, "skipping binary content");
            return Ok(FileOutcome::Skipped {
                reason: SkipReason::Filtered,
            });
        };
        if lossy {
            tracing::warn!(path = rel, "lossy latin-1 decode");
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Parsing is CPU-bound; keep it off the async workers.
        let registry = Arc::clone(&self.registry);
        let rel_owned = rel.to_string();
        let text_for_parse = text.clone();
        let mut chunks = tokio::task::spawn_blocking(move || {
            registry.parse(&rel_owned, &text_for_parse, language)
        })
        .await
        .map_err(|e| Error::internal(format!("parse task failed: {e}")))?;

        let mut seen = HashSet::new();
        chunks.retain(|c| seen.insert(c.id.clone()));

        // Diff against what the store already holds for this path.
        let prev_ids: Vec<String> = previous.map(|r| r.chunk_ids).unwrap_or_default();
        let stored_hashes: HashMap<String, String> = {
            let lease = self.pool.read(cancel).await?;
            let stored = lease.store().get(&prev_ids).await?;
            if stored.len() != prev_ids.len() && !prev_ids.is_empty() {
                // FileRecord references ids the store no longer has; fall
                // through with what exists, which forces a full re-add.
                tracing::warn!(
                    path = rel,
                    expected = prev_ids.len(),
                    found = stored.len(),
                    "integrity violation, re-adding all chunks for file"
                );
            }
            stored
                .into_iter()
                .map(|c| (c.id.clone(), c.content_hash))
                .collect()
        };

        let new_ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let to_delete: Vec<String> = prev_ids
            .iter()
            .filter(|id| !new_ids.contains(id.as_str()))
            .cloned()
            .collect();
        let to_write: Vec<&crate::domain::types::CodeChunk> = chunks
            .iter()
            .filter(|c| stored_hashes.get(&c.id) != Some(&c.content_hash))
            .collect();
        let added = to_write
            .iter()
            .filter(|c| !stored_hashes.contains_key(&c.id))
            .count();
        let updated = to_write.len() - added;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Unique content hashes embed once; the cache absorbs repeats.
        let items: Vec<(String, String)> = to_write
            .iter()
            .map(|c| (c.content_hash.clone(), c.content.clone()))
            .collect();
        let vectors = self.embedder.embed_hashed(&items, cancel).await?;
        let records: Vec<VectorRecord> = to_write
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id.clone(),
                vector,
                chunk: (*chunk).clone(),
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        {
            // Adds land before deletes; readers may briefly see a superset.
            let lease = self.pool.write(cancel).await?;
            lease.store().add(records).await?;
            lease.store().delete(&to_delete).await?;
        }

        self.relationships.register_file(rel, &chunks).await;

        let record = FileRecord {
            path: rel.to_string(),
            size,
            mtime,
            file_hash,
            chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            language,
            lossy_decode: lossy,
            indexed_at: Utc::now(),
        };
        self.metadata.put(record).await;

        Ok(FileOutcome::Indexed {
            added,
            updated,
            deleted: to_delete.len(),
        })
    }

    /// Call/import edge derivation for the given paths, best effort.
    async fn link_files(
        &self,
        paths: &[String],
        known_paths: &HashSet<String>,
        cancel: &CancellationToken,
    ) {
        for rel in paths {
            if cancel.is_cancelled() {
                return;
            }
            let Some(record) = self.metadata.get(rel).await else {
                continue;
            };
            let chunks = {
                let Ok(lease) = self.pool.read(cancel).await else {
                    return;
                };
                match lease.store().get(&record.chunk_ids).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        tracing::warn!(path = %rel, error = %e, "cannot load chunks for linking");
                        continue;
                    }
                }
            };
            let abs = self.config.project_root.join(rel);
            let text = match tokio::fs::read(&abs).await {
                Ok(bytes) => match decode_text(&bytes, record.language).into_text() {
                    Some((text, _)) => text,
                    None => continue,
                },
                Err(_) => continue,
            };
            self.relationships
                .link_file(rel, record.language, &chunks, &text, known_paths)
                .await;
        }
    }

    async fn remove_file_state(&self, rel: &str, cancel: &CancellationToken) -> Result<usize> {
        let ids = match self.metadata.get(rel).await {
            Some(record) => record.chunk_ids,
            None => {
                let lease = self.pool.read(cancel).await?;
                lease.store().ids_for_path(rel).await?
            }
        };
        if !ids.is_empty() {
            let lease = self.pool.write(cancel).await?;
            lease.store().delete(&ids).await?;
        }
        self.relationships.remove_file(rel).await;
        self.metadata.delete(rel).await;
        tracing::debug!(path = rel, chunks = ids.len(), "removed file from index");
        Ok(ids.len())
    }

    async fn finish_cancelled(&self) -> Result<IndexReport> {
        let _ = self.metadata.save().await;
        let _ = self.relationships.save().await;
        Err(Error::Cancelled)
    }

    /// Store-level failures halt the run; everything else is per-file.
    fn halts_run(&self, error: &Error) -> bool {
        matches!(
            error,
            Error::Store { .. } | Error::StoreUnavailable { .. }
        )
    }

    /// Normalise to `(absolute, project-relative)` form.
    fn resolve(&self, path: &Path) -> (PathBuf, String) {
        if path.is_absolute() {
            (path.to_path_buf(), self.filter.relative(path))
        } else {
            let rel = path.to_string_lossy().replace('\\', "/");
            (self.config.project_root.join(path), rel)
        }
    }
}
