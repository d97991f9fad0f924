//! In-memory vector store, used in tests and as a scratch backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::Result;
use crate::domain::ports::VectorStore;
use crate::domain::types::{
    CodeChunk, ScoredChunk, SimilarityMode, StoreStats, VectorRecord,
};
use crate::embedding::similarity;
use crate::store::filter::MetadataFilter;
use crate::store::rank_top_k;

pub struct MemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
    mode: SimilarityMode,
}

impl MemoryVectorStore {
    pub fn new(mode: SimilarityMode) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            mode,
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut map = self.records.write().await;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let map = self.records.read().await;
        let scored = map
            .values()
            .filter(|r| filter.matches(&r.chunk))
            .map(|r| ScoredChunk {
                id: r.id.clone(),
                score: similarity(vector, &r.vector, self.mode),
                chunk: r.chunk.clone(),
            });
        Ok(rank_top_k(scored, k))
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<CodeChunk>> {
        let map = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id).map(|r| r.chunk.clone()))
            .collect())
    }

    async fn get_vectors(&self, ids: &[String]) -> Result<Vec<(String, Vec<f32>)>> {
        let map = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id).map(|r| (r.id.clone(), r.vector.clone())))
            .collect())
    }

    async fn ids_for_path(&self, path: &str) -> Result<Vec<String>> {
        let map = self.records.read().await;
        let mut ids: Vec<String> = map
            .values()
            .filter(|r| r.chunk.file_path == path)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let map = self.records.read().await;
        let dimensions = map.values().next().map(|r| r.vector.len()).unwrap_or(0);
        Ok(StoreStats {
            total_vectors: map.len() as u64,
            dimensions,
            storage_bytes: (map.len() * dimensions * 4) as u64,
            provider: "in-memory".to_string(),
        })
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkKind, Language};

    fn record(id_seed: u32, path: &str, vector: Vec<f32>) -> VectorRecord {
        let chunk = CodeChunk::new(
            path,
            id_seed,
            id_seed + 1,
            ChunkKind::Function,
            format!("f{id_seed}"),
            Language::Python,
            format!("def f{id_seed}(): pass"),
        );
        VectorRecord {
            id: chunk.id.clone(),
            vector,
            chunk,
        }
    }

    #[tokio::test]
    async fn add_is_idempotent_by_id() {
        let store = MemoryVectorStore::new(SimilarityMode::Cosine);
        let a = record(1, "a.py", vec![1.0, 0.0]);
        store.add(vec![a.clone()]).await.unwrap();
        store.add(vec![a]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_orders_by_score_then_id() {
        let store = MemoryVectorStore::new(SimilarityMode::Cosine);
        store
            .add(vec![
                record(1, "a.py", vec![1.0, 0.0]),
                record(2, "b.py", vec![0.0, 1.0]),
                record(3, "c.py", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let results = store
            .query(&[1.0, 0.0], 10, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        // The two perfect matches tie; ids break the tie ascending.
        assert!(results[0].score >= results[1].score);
        assert!(results[0].id < results[1].id);
    }

    #[tokio::test]
    async fn filter_applies_before_ranking() {
        let store = MemoryVectorStore::new(SimilarityMode::Cosine);
        store
            .add(vec![
                record(1, "src/a.py", vec![1.0, 0.0]),
                record(2, "lib/b.py", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let filter = MetadataFilter::new().with_path_prefix("src/");
        let results = store.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "src/a.py");
    }
}
