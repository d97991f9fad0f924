//! Persistent store of directed, typed edges between chunks.
//!
//! Edges persist in their canonical direction only; queries accept either
//! direction and normalise. The store also keeps the small lookup tables
//! derivation needs: symbol → chunk ids, path → representative chunk, and
//! chunk → path.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::error::{Error, Result};
use crate::domain::types::{ChunkKind, CodeChunk, Language, RelationKind, Relationship};
use crate::relationships::extract;
use crate::relationships::graph::Graph;

const DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredEdge {
    source: String,
    target: String,
    kind: RelationKind,
    weight: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: String,
    updated_at: DateTime<Utc>,
    edges: Vec<StoredEdge>,
    /// chunk id → project-relative path.
    chunk_paths: HashMap<String, String>,
    /// symbol name → chunk ids defining it.
    symbols: HashMap<String, Vec<String>>,
    /// path → representative chunk id (file root or first chunk).
    representatives: HashMap<String, String>,
}

#[derive(Default)]
struct Inner {
    edges: HashMap<(String, String, RelationKind), f32>,
    chunk_paths: HashMap<String, String>,
    symbols: HashMap<String, HashSet<String>>,
    representatives: HashMap<String, String>,
}

pub struct RelationshipStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl RelationshipStore {
    /// Load the document, starting fresh when missing or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut inner = Inner::default();
        if let Ok(text) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<Document>(&text) {
                Ok(document) => {
                    for edge in document.edges {
                        inner
                            .edges
                            .insert((edge.source, edge.target, edge.kind), edge.weight);
                    }
                    inner.chunk_paths = document.chunk_paths;
                    inner.symbols = document
                        .symbols
                        .into_iter()
                        .map(|(k, v)| (k, v.into_iter().collect()))
                        .collect();
                    inner.representatives = document.representatives;
                }
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "relationship document corrupt, starting fresh"
                    );
                }
            }
        }
        Self {
            path,
            inner: RwLock::new(inner),
        }
    }

    /// Insert or update edges; duplicates overwrite their weight.
    pub async fn upsert(&self, edges: Vec<Relationship>) {
        let mut inner = self.inner.write().await;
        for edge in edges {
            let (kind, reversed) = edge.kind.canonical();
            let (source, target) = if reversed {
                (edge.target_id, edge.source_id)
            } else {
                (edge.source_id, edge.target_id)
            };
            inner.edges.insert((source, target, kind), edge.weight);
        }
    }

    /// Edges leaving `id` with the given kind (either direction name).
    pub async fn outgoing(&self, id: &str, kind: Option<RelationKind>) -> Vec<Relationship> {
        self.query_edges(id, kind, false).await
    }

    /// Edges arriving at `id` with the given kind (either direction name).
    pub async fn incoming(&self, id: &str, kind: Option<RelationKind>) -> Vec<Relationship> {
        self.query_edges(id, kind, true).await
    }

    async fn query_edges(
        &self,
        id: &str,
        kind: Option<RelationKind>,
        incoming: bool,
    ) -> Vec<Relationship> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for ((source, target, stored_kind), weight) in &inner.edges {
            let (wanted_kind, reversed) = match kind {
                Some(k) => k.canonical(),
                None => (*stored_kind, false),
            };
            if *stored_kind != wanted_kind {
                continue;
            }
            // A reversed kind (e.g. called_by) swaps which end counts as
            // "outgoing".
            let effective_incoming = incoming ^ reversed;
            let matches = if effective_incoming {
                target == id
            } else {
                source == id
            };
            if matches {
                out.push(Relationship {
                    source_id: source.clone(),
                    target_id: target.clone(),
                    kind: *stored_kind,
                    weight: *weight,
                });
            }
        }
        out.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        out
    }

    /// Top-k semantically similar chunks, by stored edge weight.
    pub async fn siblings(&self, id: &str, top_k: usize) -> Vec<(String, f32)> {
        let inner = self.inner.read().await;
        let mut out: Vec<(String, f32)> = inner
            .edges
            .iter()
            .filter(|((s, t, k), _)| {
                *k == RelationKind::SemanticallySimilar && (s == id || t == id)
            })
            .map(|((s, t, _), w)| {
                let other = if s == id { t.clone() } else { s.clone() };
                (other, *w)
            })
            .collect();
        out.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        out.truncate(top_k);
        out
    }

    /// Register a freshly indexed file: symbol table, representative chunk
    /// and containment edges.
    ///
    /// Clears the path's outgoing edges first but keeps incoming ones:
    /// chunk ids are position-derived, so edges from unchanged files stay
    /// valid across a reindex.
    pub async fn register_file(&self, path: &str, chunks: &[CodeChunk]) {
        let mut inner = self.inner.write().await;
        let dead: HashSet<String> = inner
            .chunk_paths
            .iter()
            .filter(|(_, p)| p.as_str() == path)
            .map(|(id, _)| id.clone())
            .collect();
        if !dead.is_empty() {
            inner.edges.retain(|(s, _, _), _| !dead.contains(s));
            inner.chunk_paths.retain(|id, _| !dead.contains(id));
            for ids in inner.symbols.values_mut() {
                ids.retain(|id| !dead.contains(id));
            }
            inner.symbols.retain(|_, ids| !ids.is_empty());
        }
        inner.representatives.remove(path);
        let representative = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::File)
            .or_else(|| chunks.first())
            .map(|c| c.id.clone());
        if let Some(rep) = representative {
            inner.representatives.insert(path.to_string(), rep);
        }
        for chunk in chunks {
            inner
                .chunk_paths
                .insert(chunk.id.clone(), path.to_string());
            if chunk.kind.is_symbolic() && !chunk.name.is_empty() {
                inner
                    .symbols
                    .entry(chunk.name.clone())
                    .or_default()
                    .insert(chunk.id.clone());
            }
            if let Some(parent) = &chunk.parent_id {
                inner.edges.insert(
                    (parent.clone(), chunk.id.clone(), RelationKind::Contains),
                    1.0,
                );
            }
        }
    }

    /// Derive call and import edges for a file against the current symbol
    /// table and known project paths. Unresolved references are dropped.
    pub async fn link_file(
        &self,
        path: &str,
        language: Language,
        chunks: &[CodeChunk],
        raw_text: &str,
        known_paths: &HashSet<String>,
    ) {
        let mut edges = Vec::new();
        {
            let inner = self.inner.read().await;

            for chunk in chunks {
                if !chunk.kind.is_symbolic() {
                    continue;
                }
                for call in extract::extract_calls(&chunk.content) {
                    if call == chunk.name {
                        continue;
                    }
                    if let Some(targets) = inner.symbols.get(&call) {
                        for target in targets {
                            if target != &chunk.id {
                                edges.push((chunk.id.clone(), target.clone(), RelationKind::Calls));
                            }
                        }
                    }
                }
            }

            if let Some(source_rep) = inner.representatives.get(path) {
                for specifier in extract::extract_imports(raw_text, language) {
                    let Some(resolved) =
                        extract::resolve_import(&specifier, path, language, known_paths)
                    else {
                        continue;
                    };
                    if resolved == path {
                        continue;
                    }
                    if let Some(target_rep) = inner.representatives.get(&resolved) {
                        edges.push((
                            source_rep.clone(),
                            target_rep.clone(),
                            RelationKind::Imports,
                        ));
                    }
                }
            }
        }

        let mut inner = self.inner.write().await;
        for (source, target, kind) in edges {
            inner.edges.insert((source, target, kind), 1.0);
        }
    }

    /// Drop all state tied to a path: its chunks' edges, symbols and
    /// representative entry.
    pub async fn remove_file(&self, path: &str) {
        let mut inner = self.inner.write().await;
        let dead: HashSet<String> = inner
            .chunk_paths
            .iter()
            .filter(|(_, p)| p.as_str() == path)
            .map(|(id, _)| id.clone())
            .collect();
        if dead.is_empty() && !inner.representatives.contains_key(path) {
            return;
        }
        inner
            .edges
            .retain(|(s, t, _), _| !dead.contains(s) && !dead.contains(t));
        inner.chunk_paths.retain(|id, _| !dead.contains(id));
        for ids in inner.symbols.values_mut() {
            ids.retain(|id| !dead.contains(id));
        }
        inner.symbols.retain(|_, ids| !ids.is_empty());
        inner.representatives.remove(path);
    }

    /// Chunk ids defining the given symbol name.
    pub async fn chunks_for_symbol(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner
            .symbols
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn path_of_chunk(&self, id: &str) -> Option<String> {
        self.inner.read().await.chunk_paths.get(id).cloned()
    }

    /// File-level import graph: path → imported paths.
    pub async fn import_graph(&self) -> Graph {
        let inner = self.inner.read().await;
        let mut graph: Graph = Graph::new();
        for ((source, target, kind), _) in &inner.edges {
            if *kind != RelationKind::Imports {
                continue;
            }
            let (Some(from), Some(to)) =
                (inner.chunk_paths.get(source), inner.chunk_paths.get(target))
            else {
                continue;
            };
            if from == to {
                continue;
            }
            let entry = graph.entry(from.clone()).or_default();
            if !entry.contains(to) {
                entry.push(to.clone());
            }
        }
        for targets in graph.values_mut() {
            targets.sort();
        }
        graph
    }

    /// Chunk-level graph following the given (canonical or inverse) kind.
    pub async fn edge_graph(&self, kind: RelationKind) -> Graph {
        let (canonical, reversed) = kind.canonical();
        let inner = self.inner.read().await;
        let mut graph: Graph = Graph::new();
        for ((source, target, stored_kind), _) in &inner.edges {
            if *stored_kind != canonical {
                continue;
            }
            let (from, to) = if reversed {
                (target, source)
            } else {
                (source, target)
            };
            graph.entry(from.clone()).or_default().push(to.clone());
        }
        for targets in graph.values_mut() {
            targets.sort();
        }
        graph
    }

    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }

    /// Persist atomically.
    pub async fn save(&self) -> Result<()> {
        let inner = self.inner.read().await;
        let mut edges: Vec<StoredEdge> = inner
            .edges
            .iter()
            .map(|((source, target, kind), weight)| StoredEdge {
                source: source.clone(),
                target: target.clone(),
                kind: *kind,
                weight: *weight,
            })
            .collect();
        edges.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.target.cmp(&b.target))
        });
        let document = Document {
            version: DOCUMENT_VERSION.to_string(),
            updated_at: Utc::now(),
            edges,
            chunk_paths: inner.chunk_paths.clone(),
            symbols: inner
                .symbols
                .iter()
                .map(|(k, v)| {
                    let mut ids: Vec<String> = v.iter().cloned().collect();
                    ids.sort();
                    (k.clone(), ids)
                })
                .collect(),
            representatives: inner.representatives.clone(),
        };
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::internal("relationship path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut tmp, &document)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| Error::store(format!("cannot persist relationships: {e}")))?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        *self.inner.write().await = Inner::default();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, RelationshipStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RelationshipStore::load(dir.path().join("relationships.db"));
        (dir, store)
    }

    fn edge(source: &str, target: &str, kind: RelationKind) -> Relationship {
        Relationship {
            source_id: source.to_string(),
            target_id: target.to_string(),
            kind,
            weight: 1.0,
        }
    }

    #[tokio::test]
    async fn inverse_kinds_normalise_to_canonical() {
        let (_dir, store) = store();
        // "a is called by b" is stored as "b calls a".
        store
            .upsert(vec![edge("a", "b", RelationKind::CalledBy)])
            .await;
        let outgoing = store.outgoing("b", Some(RelationKind::Calls)).await;
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].target_id, "a");

        let incoming = store.incoming("a", Some(RelationKind::Calls)).await;
        assert_eq!(incoming.len(), 1);

        // Asking for called_by of a flips direction again.
        let called_by = store.outgoing("a", Some(RelationKind::CalledBy)).await;
        assert_eq!(called_by.len(), 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_duplicate_edges() {
        let (_dir, store) = store();
        store.upsert(vec![edge("a", "b", RelationKind::Calls)]).await;
        let mut again = edge("a", "b", RelationKind::Calls);
        again.weight = 0.5;
        store.upsert(vec![again]).await;
        assert_eq!(store.edge_count().await, 1);
    }

    #[tokio::test]
    async fn siblings_rank_by_weight() {
        let (_dir, store) = store();
        let mut e1 = edge("a", "b", RelationKind::SemanticallySimilar);
        e1.weight = 0.9;
        let mut e2 = edge("a", "c", RelationKind::SemanticallySimilar);
        e2.weight = 0.8;
        store.upsert(vec![e1, e2]).await;
        let siblings = store.siblings("a", 1).await;
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].0, "b");
    }

    #[tokio::test]
    async fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relationships.db");
        {
            let store = RelationshipStore::load(&path);
            store.upsert(vec![edge("a", "b", RelationKind::Imports)]).await;
            store.save().await.unwrap();
        }
        let store = RelationshipStore::load(&path);
        assert_eq!(store.edge_count().await, 1);
        let out = store.outgoing("a", Some(RelationKind::Imports)).await;
        assert_eq!(out[0].target_id, "b");
    }
}
