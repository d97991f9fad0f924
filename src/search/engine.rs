//! Semantic search engine.
//!
//! Pipeline: normalise → embed → adaptive threshold → over-fetched store
//! query with metadata filtering → weighted re-rank → threshold cut →
//! deterministic ordering → optional context enrichment. The engine is
//! stateless apart from a bounded query history feeding the adaptive
//! threshold.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::ProjectConfig;
use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::types::{RelationKind, ScoredChunk, SearchResult};
use crate::embedding::Embedder;
use crate::metadata::MetadataManager;
use crate::relationships::graph::{strongly_connected_components, transitive_closure, Graph};
use crate::relationships::RelationshipStore;
use crate::search::{query, scoring};
use crate::store::{MetadataFilter, StorePool};

/// Per-call search options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Fixed similarity threshold; disables the adaptive computation.
    pub threshold: Option<f32>,
    /// Treat a path-shaped query as "find code similar to this file".
    pub find_similar: bool,
    /// Attach neighbouring chunk names from the same file.
    pub enrich: bool,
}

/// One chunk affected by a change to the analysed symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactEntry {
    pub chunk_id: String,
    pub file_path: Option<String>,
    pub depth: usize,
}

/// Transitive callers/importers of a symbol.
#[derive(Debug, Clone, Default)]
pub struct ImpactReport {
    pub symbol: String,
    pub origins: Vec<String>,
    pub affected: Vec<ImpactEntry>,
}

pub struct SearchEngine {
    config: Arc<ProjectConfig>,
    embedder: Arc<Embedder>,
    pool: Arc<StorePool>,
    relationships: Arc<RelationshipStore>,
    metadata: Arc<MetadataManager>,
    /// query → consecutive zero-result runs.
    history: DashMap<String, u32>,
}

impl SearchEngine {
    pub fn new(
        config: Arc<ProjectConfig>,
        embedder: Arc<Embedder>,
        pool: Arc<StorePool>,
        relationships: Arc<RelationshipStore>,
        metadata: Arc<MetadataManager>,
    ) -> Self {
        Self {
            config,
            embedder,
            pool,
            relationships,
            metadata,
            history: DashMap::new(),
        }
    }

    /// Semantic search over the index.
    pub async fn search(
        &self,
        raw_query: &str,
        k: usize,
        filter: &MetadataFilter,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let trimmed = raw_query.trim();
        if trimmed.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if trimmed.len() > 8192 {
            return Err(Error::invalid_argument("query exceeds 8192 characters"));
        }

        let query_vector = self.query_vector(trimmed, options, cancel).await?;
        let threshold = self.effective_threshold(trimmed, options);

        // Over-fetch so re-ranking has candidates to promote.
        let fetch_k = (k * constants::OVERFETCH_FACTOR).min(constants::OVERFETCH_CAP).max(k);
        let candidates = {
            let lease = self.pool.read(cancel).await?;
            lease.store().query(&query_vector, fetch_k, filter).await?
        };

        let symbol_query = query::is_symbol_like(trimmed);
        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .map(|hit| {
                let final_score =
                    scoring::final_score(&self.config.scoring, hit.score, &hit.chunk, symbol_query);
                SearchResult {
                    chunk: hit.chunk,
                    vector_similarity: hit.score,
                    final_score,
                    rank: 0,
                    neighbours: Vec::new(),
                }
            })
            .filter(|r| r.final_score >= threshold)
            .collect();

        // Diversity: keep the best few chunks per file.
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        let mut per_file: HashMap<String, usize> = HashMap::new();
        results.retain(|r| {
            let seen = per_file.entry(r.chunk.file_path.clone()).or_insert(0);
            *seen += 1;
            *seen <= constants::MAX_RESULTS_PER_FILE
        });
        results.truncate(k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        if options.enrich {
            self.enrich(&mut results, cancel).await;
        }

        // Bounded history: only zero-result runs matter; a hit clears it.
        if results.is_empty() {
            if self.history.len() >= constants::QUERY_HISTORY_CAPACITY {
                self.history.clear();
            }
            *self.history.entry(trimmed.to_string()).or_insert(0) += 1;
        } else {
            self.history.remove(trimmed);
        }

        tracing::debug!(
            query = trimmed,
            threshold,
            results = results.len(),
            "search complete"
        );
        Ok(results)
    }

    /// Find chunks similar to an existing chunk (by id) or file (by path),
    /// excluding the source chunk(s) from the results.
    pub async fn search_similar(
        &self,
        chunk_id_or_path: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let key = chunk_id_or_path.to_string();
        let mut source_ids: Vec<String> = vec![key.clone()];
        let mut vectors = {
            let lease = self.pool.read(cancel).await?;
            lease.store().get_vectors(std::slice::from_ref(&key)).await?
        };
        if vectors.is_empty() {
            // Not a chunk id; try it as a project-relative path.
            let lease = self.pool.read(cancel).await?;
            source_ids = lease.store().ids_for_path(chunk_id_or_path).await?;
            if source_ids.is_empty() {
                return Err(Error::not_found(format!(
                    "chunk or path {chunk_id_or_path}"
                )));
            }
            vectors = lease.store().get_vectors(&source_ids).await?;
        }
        let vector = mean_vector(vectors.iter().map(|(_, v)| v.as_slice()))
            .ok_or_else(|| Error::not_found(format!("chunk or path {chunk_id_or_path}")))?;

        let hits = {
            let lease = self.pool.read(cancel).await?;
            lease
                .store()
                .query(&vector, k + source_ids.len(), &MetadataFilter::new())
                .await?
        };
        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| !source_ids.contains(&hit.id))
            .map(|ScoredChunk { score, chunk, .. }| SearchResult {
                chunk,
                vector_similarity: score,
                final_score: score,
                rank: 0,
                neighbours: Vec::new(),
            })
            .collect();
        results.truncate(k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }
        Ok(results)
    }

    /// Transitive closure of `called_by` and `imported_by` edges from the
    /// chunks defining `symbol`, with cycle detection and a depth bound.
    pub async fn analyze_impact(&self, symbol: &str, max_depth: usize) -> Result<ImpactReport> {
        let origins = self.relationships.chunks_for_symbol(symbol).await;
        if origins.is_empty() {
            return Err(Error::not_found(format!("symbol {symbol}")));
        }
        let depth = if max_depth == 0 {
            constants::IMPACT_MAX_DEPTH
        } else {
            max_depth
        };

        // Merge the two reversed graphs: who calls me, who imports me.
        let mut graph: Graph = self.relationships.edge_graph(RelationKind::CalledBy).await;
        for (node, targets) in self.relationships.edge_graph(RelationKind::ImportedBy).await {
            let entry = graph.entry(node).or_default();
            for t in targets {
                if !entry.contains(&t) {
                    entry.push(t);
                }
            }
        }

        let mut best_depth: HashMap<String, usize> = HashMap::new();
        for origin in &origins {
            for (node, d) in transitive_closure(&graph, origin, depth) {
                best_depth
                    .entry(node)
                    .and_modify(|cur| *cur = (*cur).min(d))
                    .or_insert(d);
            }
        }
        // Chunks defining the symbol are origins, not impact.
        for origin in &origins {
            best_depth.remove(origin);
        }

        let mut affected = Vec::new();
        for (chunk_id, depth) in best_depth {
            let file_path = self.relationships.path_of_chunk(&chunk_id).await;
            affected.push(ImpactEntry {
                chunk_id,
                file_path,
                depth,
            });
        }
        affected.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.chunk_id.cmp(&b.chunk_id)));

        Ok(ImpactReport {
            symbol: symbol.to_string(),
            origins,
            affected,
        })
    }

    /// Non-trivial strongly connected components of the file import graph.
    pub async fn check_circular_dependencies(&self) -> Result<Vec<Vec<String>>> {
        let graph = self.relationships.import_graph().await;
        Ok(strongly_connected_components(&graph))
    }

    /// Effective similarity threshold for a query: an explicit option wins;
    /// otherwise the adaptive computation applies, fed by the zero-result
    /// history for this exact query.
    pub fn effective_threshold(&self, trimmed: &str, options: &SearchOptions) -> f32 {
        if let Some(t) = options.threshold {
            return t;
        }
        let zero_runs = self.history.get(trimmed).map(|e| *e).unwrap_or(0);
        scoring::adaptive_threshold(
            self.config.similarity_threshold,
            trimmed,
            zero_runs,
            query::uncommon_token_fraction(trimmed),
        )
    }

    /// Resolve the query vector: path-shaped queries with `find_similar`
    /// average the file's chunk embeddings; everything else embeds the
    /// expanded query text.
    async fn query_vector(
        &self,
        trimmed: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        if options.find_similar && query::looks_like_path(trimmed) {
            let lease = self.pool.read(cancel).await?;
            let ids = lease.store().ids_for_path(trimmed).await?;
            if !ids.is_empty() {
                let vectors = lease.store().get_vectors(&ids).await?;
                if let Some(mean) = mean_vector(vectors.iter().map(|(_, v)| v.as_slice())) {
                    return Ok(mean);
                }
            }
        }
        self.embedder
            .embed_query(&query::expand(trimmed), cancel)
            .await
    }

    /// Record a zero-result run for a query (test hook for the adaptive
    /// threshold; the search path maintains this automatically).
    #[cfg(test)]
    fn note_zero_result(&self, query: &str) {
        *self.history.entry(query.to_string()).or_insert(0) += 1;
    }

    /// Attach neighbouring chunk names (same file, by line order).
    async fn enrich(&self, results: &mut [SearchResult], cancel: &CancellationToken) {
        for result in results.iter_mut() {
            let Some(record) = self.metadata.get(&result.chunk.file_path).await else {
                continue;
            };
            let Ok(lease) = self.pool.read(cancel).await else {
                return;
            };
            let Ok(mut siblings) = lease.store().get(&record.chunk_ids).await else {
                continue;
            };
            siblings.sort_by_key(|c| c.start_line);
            result.neighbours = siblings
                .iter()
                .filter(|c| c.id != result.chunk.id && !c.name.is_empty())
                .map(|c| c.name.clone())
                .take(5)
                .collect();
        }
    }
}

/// Component-wise mean of equally sized vectors; None for an empty input.
fn mean_vector<'a>(vectors: impl Iterator<Item = &'a [f32]>) -> Option<Vec<f32>> {
    let mut mean: Option<Vec<f32>> = None;
    let mut n = 0usize;
    for v in vectors {
        match &mut mean {
            None => mean = Some(v.to_vec()),
            Some(acc) => {
                for (slot, value) in acc.iter_mut().zip(v) {
                    *slot += value;
                }
            }
        }
        n += 1;
    }
    if let Some(acc) = &mut mean {
        for slot in acc.iter_mut() {
            *slot /= n as f32;
        }
    }
    mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::VectorStore;
    use crate::domain::types::{ChunkKind, CodeChunk, Grade, Language, SimilarityMode, VectorRecord};
    use crate::embedding::providers::HashEmbeddingProvider;
    use crate::store::MemoryVectorStore;

    const DIMS: usize = 128;

    async fn engine_over(
        chunks: Vec<CodeChunk>,
    ) -> (tempfile::TempDir, SearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::new(dir.path());
        config.embedding.dimensions = DIMS;
        config.similarity_threshold = 0.05;
        let config = Arc::new(config);

        let provider = Arc::new(HashEmbeddingProvider::new(DIMS));
        let embedder = Arc::new(Embedder::new(provider, &config.embedding));

        let store = Arc::new(MemoryVectorStore::new(SimilarityMode::Dot));
        let cancel = CancellationToken::new();
        let items: Vec<(String, String)> = chunks
            .iter()
            .map(|c| (c.content_hash.clone(), c.content.clone()))
            .collect();
        let vectors = embedder.embed_hashed(&items, &cancel).await.unwrap();
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id.clone(),
                vector,
                chunk: chunk.clone(),
            })
            .collect();
        store.add(records).await.unwrap();

        let pool = Arc::new(StorePool::new(store, Default::default()));
        let metadata = Arc::new(MetadataManager::load(dir.path().join("metadata.json")));
        let relationships = Arc::new(RelationshipStore::load(dir.path().join("relationships.db")));
        let engine = SearchEngine::new(config, embedder, pool, relationships, metadata);
        (dir, engine)
    }

    fn chunk(path: &str, line: u32, name: &str, language: Language, content: &str) -> CodeChunk {
        CodeChunk::new(path, line, line + 5, ChunkKind::Function, name, language, content)
    }

    #[tokio::test]
    async fn results_are_ordered_and_above_threshold() {
        let (_dir, engine) = engine_over(vec![
            chunk("a.py", 1, "parse_config", Language::Python, "def parse_config(path):\n    settings = load(path)\n    return settings\n"),
            chunk("b.py", 1, "render_widget", Language::Python, "def render_widget(tree):\n    paint(tree)\n    return tree\n"),
        ])
        .await;
        let cancel = CancellationToken::new();
        let results = engine
            .search(
                "parse config settings",
                5,
                &MetadataFilter::new(),
                &SearchOptions::default(),
                &cancel,
            )
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.name, "parse_config");
        for pair in results.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
        let threshold = engine.effective_threshold("parse config settings", &SearchOptions::default());
        assert!(results.iter().all(|r| r.final_score >= threshold));
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.rank, i + 1);
        }
    }

    #[tokio::test]
    async fn filter_is_honoured_end_to_end() {
        let mut graded = chunk("good.py", 1, "load_settings", Language::Python, "def load_settings():\n    return read()\n");
        graded.quality.grade = Grade::A;
        let mut poor = chunk("bad.rb", 1, "load_settings", Language::Ruby, "def load_settings\n  read\nend\n");
        poor.quality.grade = Grade::D;
        let (_dir, engine) = engine_over(vec![graded, poor]).await;

        let filter = MetadataFilter::new()
            .with_language(Language::Python)
            .with_max_grade(Grade::B);
        let results = engine
            .search(
                "load settings",
                10,
                &filter,
                &SearchOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!results.is_empty());
        for r in &results {
            assert_eq!(r.chunk.language, Language::Python);
            assert!(r.chunk.quality.grade <= Grade::B);
        }
    }

    #[tokio::test]
    async fn zero_result_history_lowers_threshold_boundedly() {
        let (_dir, engine) = engine_over(vec![]).await;
        let options = SearchOptions::default();
        let query = "a query with no matching chunks anywhere at all";
        let fresh = engine.effective_threshold(query, &options);
        engine.note_zero_result(query);
        engine.note_zero_result(query);
        engine.note_zero_result(query);
        let lowered = engine.effective_threshold(query, &options);
        assert!(lowered < fresh);
        assert!(fresh - lowered <= crate::constants::MAX_ADAPTIVE_DROP + 1e-6);
    }

    #[tokio::test]
    async fn explicit_threshold_disables_adaptation() {
        let (_dir, engine) = engine_over(vec![]).await;
        let options = SearchOptions {
            threshold: Some(0.9),
            ..Default::default()
        };
        assert_eq!(engine.effective_threshold("q", &options), 0.9);
    }

    #[tokio::test]
    async fn search_similar_excludes_the_source_chunk() {
        let a = chunk("a.py", 1, "alpha", Language::Python, "def alpha():\n    shared_helper()\n");
        let b = chunk("b.py", 1, "beta", Language::Python, "def beta():\n    shared_helper()\n");
        let a_id = a.id.clone();
        let (_dir, engine) = engine_over(vec![a, b]).await;
        let results = engine
            .search_similar(&a_id, 5, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.chunk.id != a_id));
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let (_dir, engine) = engine_over(vec![]).await;
        let results = engine
            .search(
                "   ",
                5,
                &MetadataFilter::new(),
                &SearchOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
