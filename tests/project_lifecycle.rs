//! End-to-end ProjectIndex lifecycle: initialize, index, search, relate,
//! recover, reset.

use std::collections::HashSet;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use code_intelligence::{
    Grade, Language, MetadataFilter, ProjectConfig, ProjectIndex, SearchOptions,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn config_for(root: &Path) -> ProjectConfig {
    let mut config = ProjectConfig::new(root);
    config.respect_gitignore = false;
    config.embedding.dimensions = 64;
    config.similarity_threshold = 0.05;
    config
}

fn sample_project(root: &Path) {
    write(
        root,
        "src/settings.py",
        "def load_settings(path):\n    \"\"\"Read configuration settings from disk.\"\"\"\n    data = read_file(path)\n    return parse_settings(data)\n",
    );
    write(
        root,
        "src/render.py",
        "def render_widget(tree):\n    \"\"\"Paint the widget tree.\"\"\"\n    surface = prepare(tree)\n    return paint(surface)\n",
    );
    write(root, "README.md", "# Sample\n\nA project used by the lifecycle tests, with enough text in the body to form a full section.\n");
}

#[tokio::test]
async fn initialize_index_search_status_reset() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let cancel = CancellationToken::new();

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    let report = index.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_indexed, 3);
    assert!(report.is_success());

    let results = index
        .search(
            "load configuration settings",
            5,
            &MetadataFilter::new(),
            &SearchOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.name, "load_settings");

    let status = index.get_status().await.unwrap();
    assert_eq!(status.total_files, 3);
    assert!(status.total_chunks >= 3);
    assert_eq!(status.languages.get("python"), Some(&2));
    assert!(status.last_indexed_at.is_some());

    let state_dir = project
        .path()
        .join(code_intelligence::constants::STATE_DIR_NAME);
    assert!(state_dir.join("config.json").exists());
    assert!(state_dir.join("metadata.json").exists());
    assert!(state_dir.join("vectors").exists());

    index.reset().await.unwrap();
    assert!(!state_dir.exists());
}

#[tokio::test]
async fn reopen_skips_unchanged_files() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let cancel = CancellationToken::new();

    {
        let index = ProjectIndex::initialize(config_for(project.path()))
            .await
            .unwrap();
        index.index_project(false, &cancel).await.unwrap();
    }

    let index = ProjectIndex::open(project.path()).await.unwrap();
    let report = index.index_project(false, &cancel).await.unwrap();
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_skipped, 3);
}

#[tokio::test]
async fn reset_and_reinitialize_reproduce_the_same_chunk_set() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let cancel = CancellationToken::new();

    async fn collect_ids(index: &ProjectIndex, cancel: &CancellationToken) -> HashSet<String> {
        index
            .search(
                "settings widget render",
                20,
                &MetadataFilter::new(),
                &SearchOptions {
                    threshold: Some(-1.0),
                    ..Default::default()
                },
                cancel,
            )
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.id)
            .collect()
    }

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();
    let before = collect_ids(&index, &cancel).await;
    assert!(!before.is_empty());
    index.reset().await.unwrap();

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();
    let after = collect_ids(&index, &cancel).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn corrupted_store_recovers_and_answers_the_same_query() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let cancel = CancellationToken::new();
    let query = "paint the widget tree";

    let top_before: Vec<String> = {
        let index = ProjectIndex::initialize(config_for(project.path()))
            .await
            .unwrap();
        index.index_project(false, &cancel).await.unwrap();
        index
            .search(
                query,
                3,
                &MetadataFilter::new(),
                &SearchOptions::default(),
                &cancel,
            )
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.id)
            .collect()
    };
    assert!(!top_before.is_empty());

    // Flip bytes in the store's primary index file.
    let index_file = project
        .path()
        .join(code_intelligence::constants::STATE_DIR_NAME)
        .join("vectors/index.json");
    let text = std::fs::read_to_string(&index_file)
        .unwrap()
        .replacen("\"checksum\":\"", "\"checksum\":\"dead", 1);
    std::fs::write(&index_file, text).unwrap();

    // Reopening detects the corruption and recovers before serving queries.
    let index = ProjectIndex::open(project.path()).await.unwrap();
    let top_after: Vec<String> = index
        .search(
            query,
            3,
            &MetadataFilter::new(),
            &SearchOptions::default(),
            &cancel,
        )
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.chunk.id)
        .collect();
    assert_eq!(top_before, top_after);
}

#[tokio::test]
async fn import_cycle_is_reported_as_one_scc_of_three() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "a.py", "import b\n");
    write(project.path(), "b.py", "import c\n");
    write(project.path(), "c.py", "import a\n");
    let cancel = CancellationToken::new();

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();

    let cycles = index.check_circular_dependencies().await.unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0], vec!["a.py", "b.py", "c.py"]);
}

#[tokio::test]
async fn impact_analysis_follows_callers() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "util.py",
        "def helper():\n    return 1\n",
    );
    write(
        project.path(),
        "app.py",
        "def run():\n    return helper()\n",
    );
    let cancel = CancellationToken::new();

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();

    let report = index.analyze_impact("helper", 3).await.unwrap();
    assert_eq!(report.symbol, "helper");
    assert_eq!(report.affected.len(), 1);
    assert_eq!(report.affected[0].depth, 1);
    assert_eq!(report.affected[0].file_path.as_deref(), Some("app.py"));

    // Unknown symbols are a clean not-found.
    assert!(index.analyze_impact("missing_symbol", 3).await.is_err());
}

#[tokio::test]
async fn filtered_search_never_leaks_other_languages_or_grades() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "clean.py",
        "def fetch_user(user_id):\n    record = lookup(user_id)\n    return record\n",
    );
    write(
        project.path(),
        "messy.rb",
        "def fetch_user(user_id)\n  lookup(user_id)\nend\n",
    );
    let cancel = CancellationToken::new();

    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();

    let filter = MetadataFilter::new()
        .with_language(Language::Python)
        .with_max_grade(Grade::B);
    let results = index
        .search(
            "fetch user record",
            10,
            &filter,
            &SearchOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.chunk.language, Language::Python);
        assert!(result.chunk.quality.grade <= Grade::B);
    }
}

#[tokio::test]
async fn enrichment_attaches_neighbour_names() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "pair.py",
        "def first_function():\n    return alpha()\n\n\ndef second_function():\n    return beta()\n",
    );
    let cancel = CancellationToken::new();
    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();

    let results = index
        .search(
            "first function alpha",
            1,
            &MetadataFilter::new(),
            &SearchOptions {
                enrich: true,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let neighbours = &results[0].neighbours;
    let own = &results[0].chunk.name;
    assert!(!neighbours.contains(own));
    assert_eq!(neighbours.len(), 1);
}

#[tokio::test]
async fn remove_path_drops_chunks_and_record() {
    let project = tempfile::tempdir().unwrap();
    sample_project(project.path());
    let cancel = CancellationToken::new();
    let index = ProjectIndex::initialize(config_for(project.path()))
        .await
        .unwrap();
    index.index_project(false, &cancel).await.unwrap();

    let removed = index
        .remove_path(Path::new("src/render.py"))
        .await
        .unwrap();
    assert!(removed >= 1);

    let status = index.get_status().await.unwrap();
    assert_eq!(status.total_files, 2);

    let results = index
        .search(
            "paint widget tree surface",
            10,
            &MetadataFilter::new().with_path_prefix("src/render.py"),
            &SearchOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert!(results.is_empty());
}
