//! Incremental indexing protocol tests over the in-memory store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use code_intelligence::chunking::ParserRegistry;
use code_intelligence::domain::ports::{EmbeddingProvider, VectorStore};
use code_intelligence::domain::types::{Embedding, FileOutcome, SimilarityMode};
use code_intelligence::embedding::providers::HashEmbeddingProvider;
use code_intelligence::embedding::Embedder;
use code_intelligence::indexing::{Indexer, NullProgress};
use code_intelligence::metadata::MetadataManager;
use code_intelligence::relationships::RelationshipStore;
use code_intelligence::store::{MemoryVectorStore, StorePool};
use code_intelligence::{Error, ProjectConfig};

const DIMS: usize = 64;

struct Harness {
    _state: tempfile::TempDir,
    store: Arc<MemoryVectorStore>,
    metadata: Arc<MetadataManager>,
    indexer: Indexer,
}

fn build(root: &Path) -> Harness {
    build_with_provider(root, Arc::new(HashEmbeddingProvider::new(DIMS)))
}

fn build_with_provider(root: &Path, provider: Arc<dyn EmbeddingProvider>) -> Harness {
    let state = tempfile::tempdir().unwrap();
    let mut config = ProjectConfig::new(root);
    config.respect_gitignore = false;
    config.embedding.dimensions = DIMS;
    let config = Arc::new(config);

    let embedder = Arc::new(Embedder::new(provider, &config.embedding));
    let store = Arc::new(MemoryVectorStore::new(SimilarityMode::Dot));
    let pool = Arc::new(StorePool::new(
        Arc::clone(&store) as Arc<dyn VectorStore>,
        Default::default(),
    ));
    let metadata = Arc::new(MetadataManager::load(state.path().join("metadata.json")));
    let relationships = Arc::new(RelationshipStore::load(state.path().join("relationships.db")));
    let registry = Arc::new(ParserRegistry::new(&config.chunking));

    let indexer = Indexer::new(
        Arc::clone(&config),
        registry,
        embedder,
        pool,
        Arc::clone(&metadata),
        relationships,
        Arc::new(NullProgress),
    )
    .unwrap();

    Harness {
        _state: state,
        store,
        metadata,
        indexer,
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn second_run_on_unchanged_tree_does_no_work() {
    let project = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write(
            project.path(),
            &format!("mod_{i}.py"),
            &format!("def f{i}(x):\n    return x + {i}\n"),
        );
    }
    let harness = build(project.path());
    let cancel = CancellationToken::new();

    let first = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(first.files_indexed, 5);
    assert!(first.chunks_added >= 5);

    let second = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 5);
    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.chunks_updated, 0);
    assert_eq!(second.chunks_deleted, 0);
}

#[tokio::test]
async fn modifying_one_file_reindexes_exactly_that_file() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "a.py", "def a():\n    return 1\n");
    write(project.path(), "b.py", "def b():\n    return 2\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();

    harness.indexer.index_project(false, &cancel).await.unwrap();
    write(project.path(), "b.py", "def b():\n    return 20\n");

    let report = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.chunks_updated, 1);
    assert_eq!(report.chunks_added, 0);
}

#[tokio::test]
async fn store_ids_match_file_record_after_index() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "app.py",
        "class App:\n    def run(self):\n        return 1\n\n    def stop(self):\n        return 0\n",
    );
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    harness.indexer.index_project(false, &cancel).await.unwrap();

    let record = harness.metadata.get("app.py").await.unwrap();
    let store_ids: HashSet<String> = harness
        .store
        .ids_for_path("app.py")
        .await
        .unwrap()
        .into_iter()
        .collect();
    let record_ids: HashSet<String> = record.chunk_ids.iter().cloned().collect();
    assert_eq!(store_ids, record_ids);
    assert!(!record_ids.is_empty());
}

#[tokio::test]
async fn remove_then_reindex_restores_the_same_chunk_ids() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "x.py", "def stable():\n    return 42\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();

    harness.indexer.index_project(false, &cancel).await.unwrap();
    let before: HashSet<String> = harness
        .store
        .ids_for_path("x.py")
        .await
        .unwrap()
        .into_iter()
        .collect();

    harness
        .indexer
        .remove_path(Path::new("x.py"))
        .await
        .unwrap();
    assert!(harness.store.ids_for_path("x.py").await.unwrap().is_empty());
    assert!(harness.metadata.get("x.py").await.is_none());

    harness
        .indexer
        .index_path(Path::new("x.py"), &cancel)
        .await
        .unwrap();
    let after: HashSet<String> = harness
        .store
        .ids_for_path("x.py")
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(before, after);
}

/// Counts texts that actually reach the model.
struct CountingProvider {
    inner: HashEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed_batch(&self, texts: &[String]) -> code_intelligence::Result<Vec<Embedding>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn provider_name(&self) -> &str {
        "counting"
    }
}

#[tokio::test]
async fn identical_function_bodies_embed_once() {
    let project = tempfile::tempdir().unwrap();
    // Two byte-identical function definitions at different positions.
    write(
        project.path(),
        "twins.py",
        "def twin():\n    value = compute()\n    return value\n\n\ndef twin():\n    value = compute()\n    return value\n",
    );
    let provider = Arc::new(CountingProvider {
        inner: HashEmbeddingProvider::new(DIMS),
        calls: AtomicUsize::new(0),
    });
    let harness = build_with_provider(project.path(), Arc::clone(&provider) as _);
    let cancel = CancellationToken::new();
    harness.indexer.index_project(false, &cancel).await.unwrap();

    let record = harness.metadata.get("twins.py").await.unwrap();
    assert_eq!(record.chunk_ids.len(), 2);

    let chunks = harness.store.get(&record.chunk_ids).await.unwrap();
    assert_eq!(chunks[0].content_hash, chunks[1].content_hash);
    // One unique content hash, one text through the model.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_file_yields_one_empty_root_chunk() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "empty.py", "");
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    let report = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_indexed, 1);

    let record = harness.metadata.get("empty.py").await.unwrap();
    assert_eq!(record.chunk_ids.len(), 1);
    let chunks = harness.store.get(&record.chunk_ids).await.unwrap();
    assert_eq!(chunks[0].content, "");
}

#[tokio::test]
async fn deleted_files_are_cleaned_up_on_the_next_run() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "keep.py", "def keep():\n    return 1\n");
    write(project.path(), "gone.py", "def gone():\n    return 2\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    harness.indexer.index_project(false, &cancel).await.unwrap();

    std::fs::remove_file(project.path().join("gone.py")).unwrap();
    let report = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_removed, 1);
    assert!(harness.store.ids_for_path("gone.py").await.unwrap().is_empty());
    assert!(harness.metadata.get("gone.py").await.is_none());
    assert!(harness.metadata.get("keep.py").await.is_some());
}

#[tokio::test]
async fn unicode_filenames_index_consistently() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "héllo.py", "def hola():\n    return 1\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    let report = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_indexed, 1);
    let record = harness.metadata.get("héllo.py").await.unwrap();
    assert!(!record.chunk_ids.is_empty());

    // A second run treats the same name as unchanged.
    let second = harness.indexer.index_project(false, &cancel).await.unwrap();
    assert_eq!(second.files_skipped, 1);
}

#[tokio::test]
async fn pre_cancelled_token_stops_the_run_without_metadata_writes() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "a.py", "def a():\n    return 1\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = harness
        .indexer
        .index_project(false, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(harness.metadata.get("a.py").await.is_none());
}

#[tokio::test]
async fn force_bypasses_the_hash_gate() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "a.py", "def a():\n    return 1\n");
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    harness.indexer.index_project(false, &cancel).await.unwrap();

    let forced = harness.indexer.index_project(true, &cancel).await.unwrap();
    assert_eq!(forced.files_indexed, 1);
    assert_eq!(forced.files_skipped, 0);
    // Content is unchanged, so the store sees no chunk churn.
    assert_eq!(forced.chunks_added, 0);
    assert_eq!(forced.chunks_updated, 0);
}

#[tokio::test]
async fn single_file_outcome_reports_chunk_churn() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "m.py",
        "def one():\n    return 1\n\n\ndef two():\n    return 2\n",
    );
    let harness = build(project.path());
    let cancel = CancellationToken::new();
    let outcome = harness
        .indexer
        .index_path(Path::new("m.py"), &cancel)
        .await
        .unwrap();
    match outcome {
        FileOutcome::Indexed { added, updated, deleted } => {
            assert_eq!(added, 2);
            assert_eq!(updated, 0);
            assert_eq!(deleted, 0);
        }
        other => panic!("expected Indexed, got {other:?}"),
    }

    // Dropping one function deletes its chunk.
    write(project.path(), "m.py", "def one():\n    return 1\n");
    let outcome = harness
        .indexer
        .index_path(Path::new("m.py"), &cancel)
        .await
        .unwrap();
    match outcome {
        FileOutcome::Indexed { deleted, .. } => assert_eq!(deleted, 1),
        other => panic!("expected Indexed, got {other:?}"),
    }
}
