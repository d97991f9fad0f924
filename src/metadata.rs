//! Metadata Manager: persistent `path → FileRecord` bookkeeping.
//!
//! A single JSON document with atomic write-to-temp + rename persistence.
//! The manager never stores vectors, only the change-detection state the
//! Indexer consults before doing any parse/embed/store work.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::error::{Error, Result};
use crate::domain::types::FileRecord;

const DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: String,
    updated_at: DateTime<Utc>,
    files: HashMap<String, FileRecord>,
}

pub struct MetadataManager {
    path: PathBuf,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl MetadataManager {
    /// Load the document, starting fresh when it is missing or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let files = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Document>(&text) {
                Ok(document) => document.files,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "metadata document corrupt, starting fresh"
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            files: RwLock::new(files),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, path: &str) -> Option<FileRecord> {
        self.files.read().await.get(path).cloned()
    }

    /// Upsert a record in memory. Call [`MetadataManager::save`] to persist.
    pub async fn put(&self, record: FileRecord) {
        self.files.write().await.insert(record.path.clone(), record);
    }

    pub async fn delete(&self, path: &str) -> bool {
        self.files.write().await.remove(path).is_some()
    }

    pub async fn all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn all_records(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.files.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Apply removals and upserts as one unit: the on-disk document matches
    /// the new state, or memory rolls back and the error surfaces.
    pub async fn bulk_replace(
        &self,
        records: Vec<FileRecord>,
        removed_paths: &[String],
    ) -> Result<()> {
        let mut files = self.files.write().await;
        let mut staged = files.clone();
        for path in removed_paths {
            staged.remove(path);
        }
        for record in records {
            staged.insert(record.path.clone(), record);
        }
        persist(&self.path, &staged)?;
        *files = staged;
        Ok(())
    }

    /// Persist the in-memory state atomically.
    pub async fn save(&self) -> Result<()> {
        let files = self.files.read().await;
        persist(&self.path, &files)
    }

    /// Drop all records and remove the document.
    pub async fn clear(&self) -> Result<()> {
        self.files.write().await.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn persist(path: &Path, files: &HashMap<String, FileRecord>) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::internal("metadata path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;
    let document = Document {
        version: DOCUMENT_VERSION.to_string(),
        updated_at: Utc::now(),
        files: files.clone(),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    serde_json::to_writer(&mut tmp, &document)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .map_err(|e| Error::store(format!("cannot persist metadata: {e}")))?;
    Ok(())
}
