//! Filesystem vector store.
//!
//! Layout under the `vectors/` directory:
//! - `index.json`: header (magic, version, dimensions, similarity, checksum)
//!   plus one entry per id mapping to a segment slot and the chunk metadata.
//! - `segments.bin`: fixed-stride f32 vectors behind an 12-byte header.
//!
//! Corruption is detected on open (magic/version/checksum/dimension
//! mismatches, truncated segment) and on slot reads; such errors carry the
//! corruption flag so callers can enter the recovery protocol.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::error::{Error, Result};
use crate::domain::ports::VectorStore;
use crate::domain::types::{
    CodeChunk, ScoredChunk, SimilarityMode, StoreStats, VectorRecord,
};
use crate::embedding::similarity;
use crate::hashing;
use crate::store::filter::MetadataFilter;
use crate::store::rank_top_k;

const INDEX_MAGIC: &str = "ci-vectors";
const INDEX_VERSION: u32 = 1;
const SEGMENT_MAGIC: &[u8; 8] = b"CIVEC001";
const SEGMENT_HEADER_LEN: u64 = 12;

#[derive(Debug, Clone)]
pub struct FilesystemStoreConfig {
    pub base_dir: PathBuf,
    pub dimensions: usize,
    pub similarity: SimilarityMode,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    magic: String,
    version: u32,
    dimensions: usize,
    similarity: SimilarityMode,
    /// Digest over the serialised entries; guards against partial writes.
    checksum: String,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    slot: u64,
    chunk: CodeChunk,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, IndexEntry>,
    free_slots: Vec<u64>,
    next_slot: u64,
}

#[derive(Debug)]
pub struct FilesystemVectorStore {
    config: FilesystemStoreConfig,
    inner: RwLock<Inner>,
}

impl FilesystemVectorStore {
    /// Open an existing store or create a fresh one.
    ///
    /// Returns a corruption-flagged error when the persisted state fails
    /// validation; see [`crate::store::recovery`].
    pub fn open(config: FilesystemStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let index_path = index_path(&config.base_dir);
        let segment_path = segment_path(&config.base_dir);

        if !index_path.exists() {
            let store = Self {
                inner: RwLock::new(Inner::default()),
                config,
            };
            store.write_segment_header()?;
            store.persist_index_sync(&Inner::default())?;
            return Ok(store);
        }

        let text = std::fs::read_to_string(&index_path)?;
        let document: IndexDocument = serde_json::from_str(&text)
            .map_err(|e| Error::corruption(format!("index document unreadable: {e}")))?;
        validate_document(&document, &config)?;

        let entries = document.entries;
        let used: std::collections::BTreeSet<u64> = entries.values().map(|e| e.slot).collect();
        let next_slot = used.iter().max().map(|m| m + 1).unwrap_or(0);
        let free_slots: Vec<u64> = (0..next_slot).filter(|s| !used.contains(s)).collect();

        // The segment must cover every referenced slot.
        let stride = config.dimensions as u64 * 4;
        let segment_len = std::fs::metadata(&segment_path)
            .map_err(|e| Error::corruption(format!("segment file missing: {e}")))?
            .len();
        validate_segment_header(&segment_path, config.dimensions)?;
        if let Some(max_slot) = used.iter().max() {
            let needed = SEGMENT_HEADER_LEN + (max_slot + 1) * stride;
            if segment_len < needed {
                return Err(Error::corruption(format!(
                    "segment truncated: {segment_len} bytes, need {needed}"
                )));
            }
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                entries,
                free_slots,
                next_slot,
            }),
            config,
        })
    }

    pub fn config(&self) -> &FilesystemStoreConfig {
        &self.config
    }

    /// Parse whatever is readable from a corrupted store without checksum
    /// validation. Used by the recovery salvage pass.
    pub fn salvage_entries(base_dir: &Path, dimensions: usize) -> Vec<VectorRecord> {
        let Ok(text) = std::fs::read_to_string(index_path(base_dir)) else {
            return Vec::new();
        };
        let Ok(document) = serde_json::from_str::<IndexDocument>(&text) else {
            return Vec::new();
        };
        let Ok(mut segment) = std::fs::File::open(segment_path(base_dir)) else {
            return Vec::new();
        };

        let stride = dimensions as u64 * 4;
        let mut recovered = Vec::new();
        for (id, entry) in document.entries {
            let offset = SEGMENT_HEADER_LEN + entry.slot * stride;
            if segment.seek(SeekFrom::Start(offset)).is_err() {
                continue;
            }
            let mut bytes = vec![0u8; dimensions * 4];
            if segment.read_exact(&mut bytes).is_err() {
                continue;
            }
            let vector = bytes_to_vector(&bytes);
            recovered.push(VectorRecord {
                id,
                vector,
                chunk: entry.chunk,
            });
        }
        recovered
    }

    fn write_segment_header(&self) -> Result<()> {
        let path = segment_path(&self.config.base_dir);
        if path.exists() {
            return Ok(());
        }
        let mut file = std::fs::File::create(&path)?;
        file.write_all(SEGMENT_MAGIC)?;
        file.write_all(&(self.config.dimensions as u32).to_le_bytes())?;
        Ok(())
    }

    fn persist_index_sync(&self, inner: &Inner) -> Result<()> {
        let document = IndexDocument {
            magic: INDEX_MAGIC.to_string(),
            version: INDEX_VERSION,
            dimensions: self.config.dimensions,
            similarity: self.config.similarity,
            checksum: entries_checksum(&inner.entries)?,
            entries: inner.entries.clone(),
        };
        let path = index_path(&self.config.base_dir);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.config.base_dir)?;
        serde_json::to_writer(&mut tmp, &document)?;
        tmp.persist(&path)
            .map_err(|e| Error::store(format!("cannot persist index: {e}")))?;
        Ok(())
    }

    fn write_vector(&self, slot: u64, vector: &[f32]) -> Result<()> {
        let stride = self.config.dimensions as u64 * 4;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(segment_path(&self.config.base_dir))?;
        file.seek(SeekFrom::Start(SEGMENT_HEADER_LEN + slot * stride))?;
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        file.write_all(&bytes)?;
        Ok(())
    }

    fn read_vector(&self, file: &mut std::fs::File, slot: u64) -> Result<Vec<f32>> {
        let stride = self.config.dimensions as u64 * 4;
        file.seek(SeekFrom::Start(SEGMENT_HEADER_LEN + slot * stride))?;
        let mut bytes = vec![0u8; self.config.dimensions * 4];
        file.read_exact(&mut bytes)
            .map_err(|e| Error::corruption(format!("short read at slot {slot}: {e}")))?;
        Ok(bytes_to_vector(&bytes))
    }

    fn open_segment(&self) -> Result<std::fs::File> {
        std::fs::File::open(segment_path(&self.config.base_dir))
            .map_err(|e| Error::corruption(format!("segment file unreadable: {e}")))
    }
}

#[async_trait]
impl VectorStore for FilesystemVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        for record in &records {
            if record.vector.len() != self.config.dimensions {
                return Err(Error::store(format!(
                    "vector for {} has {} dimensions, store expects {}",
                    record.id,
                    record.vector.len(),
                    self.config.dimensions
                )));
            }
            let slot = if let Some(existing) = inner.entries.get(&record.id) {
                existing.slot
            } else if let Some(free) = inner.free_slots.pop() {
                free
            } else {
                let slot = inner.next_slot;
                inner.next_slot += 1;
                slot
            };
            self.write_vector(slot, &record.vector)?;
            inner.entries.insert(
                record.id.clone(),
                IndexEntry {
                    slot,
                    chunk: record.chunk.clone(),
                },
            );
        }
        self.persist_index_sync(&inner)?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        let mut changed = false;
        for id in ids {
            if let Some(entry) = inner.entries.remove(id) {
                inner.free_slots.push(entry.slot);
                changed = true;
            }
        }
        if changed {
            self.persist_index_sync(&inner)?;
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let inner = self.inner.read().await;
        if inner.entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut segment = self.open_segment()?;
        let mut scored = Vec::new();
        for (id, entry) in &inner.entries {
            if !filter.matches(&entry.chunk) {
                continue;
            }
            let stored = self.read_vector(&mut segment, entry.slot)?;
            scored.push(ScoredChunk {
                id: id.clone(),
                score: similarity(vector, &stored, self.config.similarity),
                chunk: entry.chunk.clone(),
            });
        }
        Ok(rank_top_k(scored.into_iter(), k))
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<CodeChunk>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| e.chunk.clone()))
            .collect())
    }

    async fn get_vectors(&self, ids: &[String]) -> Result<Vec<(String, Vec<f32>)>> {
        let inner = self.inner.read().await;
        let mut segment = self.open_segment()?;
        let mut out = Vec::new();
        for id in ids {
            if let Some(entry) = inner.entries.get(id) {
                out.push((id.clone(), self.read_vector(&mut segment, entry.slot)?));
            }
        }
        Ok(out)
    }

    async fn ids_for_path(&self, path: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|(_, e)| e.chunk.file_path == path)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().await.entries.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        let storage_bytes = std::fs::metadata(segment_path(&self.config.base_dir))
            .map(|m| m.len())
            .unwrap_or(0)
            + std::fs::metadata(index_path(&self.config.base_dir))
                .map(|m| m.len())
                .unwrap_or(0);
        Ok(StoreStats {
            total_vectors: inner.entries.len() as u64,
            dimensions: self.config.dimensions,
            storage_bytes,
            provider: "filesystem".to_string(),
        })
    }

    async fn flush(&self) -> Result<()> {
        let inner = self.inner.read().await;
        self.persist_index_sync(&inner)
    }

    fn provider_name(&self) -> &str {
        "filesystem"
    }
}

fn index_path(base_dir: &Path) -> PathBuf {
    base_dir.join("index.json")
}

fn segment_path(base_dir: &Path) -> PathBuf {
    base_dir.join("segments.bin")
}

fn entries_checksum(entries: &BTreeMap<String, IndexEntry>) -> Result<String> {
    // BTreeMap serialisation is deterministic, so the digest is stable.
    let serialised = serde_json::to_string(entries)?;
    Ok(hashing::content_hash(&serialised))
}

fn validate_document(document: &IndexDocument, config: &FilesystemStoreConfig) -> Result<()> {
    if document.magic != INDEX_MAGIC {
        return Err(Error::corruption(format!(
            "bad index magic {:?}",
            document.magic
        )));
    }
    if document.version != INDEX_VERSION {
        return Err(Error::corruption(format!(
            "unsupported index version {}",
            document.version
        )));
    }
    if document.dimensions != config.dimensions {
        return Err(Error::corruption(format!(
            "index dimensions {} do not match configured {}",
            document.dimensions, config.dimensions
        )));
    }
    if document.similarity != config.similarity {
        return Err(Error::corruption(
            "index similarity mode does not match configuration",
        ));
    }
    let expected = entries_checksum(&document.entries)?;
    if expected != document.checksum {
        return Err(Error::corruption("index checksum mismatch"));
    }
    Ok(())
}

fn validate_segment_header(path: &Path, dimensions: usize) -> Result<()> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| Error::corruption(format!("segment file unreadable: {e}")))?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|e| Error::corruption(format!("segment header unreadable: {e}")))?;
    if &magic != SEGMENT_MAGIC {
        return Err(Error::corruption("bad segment magic"));
    }
    let mut dim_bytes = [0u8; 4];
    file.read_exact(&mut dim_bytes)
        .map_err(|e| Error::corruption(format!("segment header unreadable: {e}")))?;
    let dim = u32::from_le_bytes(dim_bytes) as usize;
    if dim != dimensions {
        return Err(Error::corruption(format!(
            "segment dimensions {dim} do not match configured {dimensions}"
        )));
    }
    Ok(())
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
