//! End-to-end indexing tests over the SQLite vector backend.
//!
//! These drive the full pass — scan, diff, chunk, embed, store, commit —
//! against a real temp project and the on-disk database, with a
//! deterministic embedder standing in for the network.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use bugscout::config::Config;
use bugscout::db;
use bugscout::embedding::Embedder;
use bugscout::indexer::sync_index;
use bugscout::manifest::load_manifest;
use bugscout::progress::NoProgress;
use bugscout::tools::search_code;
use bugscout::vector_store::{SqliteVectorStore, VectorStore};

/// Embeds by keyword presence so retrieval order is predictable.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                vec![
                    if t.contains("login") { 1.0 } else { 0.0 },
                    if t.contains("billing") { 1.0 } else { 0.0 },
                    0.05,
                ]
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        3
    }
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn numbered_lines(n: usize, tag: &str) -> String {
    (0..n)
        .map(|i| format!("{} line {}", tag, i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn small_config() -> Config {
    let mut config = Config::default();
    config.chunking.max_chars = 300;
    config.chunking.overlap_chars = 60;
    config
}

#[tokio::test]
async fn index_then_retrieve_with_accurate_citations() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "src/auth.py",
        "def login(user):\n    check(user)\n    return session(user)\n",
    );
    write_file(
        dir.path(),
        "src/billing.py",
        "def charge(account):\n    billing_client.charge(account)\n",
    );

    let config = small_config();
    let pool = db::connect(&Config::state_dir(dir.path())).await.unwrap();
    let store = SqliteVectorStore::new(pool.clone(), "code");
    let embedder = KeywordEmbedder;

    let stats = sync_index(dir.path(), &config, &store, &embedder, false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(stats.added, 2);

    let hits = search_code(&store, &embedder, "login fails", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "src/auth.py");

    // The citation's line range must reproduce the cited text exactly.
    let source = std::fs::read_to_string(dir.path().join(&hits[0].path)).unwrap();
    let lines: Vec<&str> = source.lines().collect();
    let cited = lines[(hits[0].start_line as usize - 1)..=(hits[0].end_line as usize - 1)]
        .join("\n");
    assert_eq!(hits[0].text, cited);
    assert_eq!(
        hits[0].citation(),
        format!("src/auth.py:{}-{}", hits[0].start_line, hits[0].end_line)
    );

    pool.close().await;
}

#[tokio::test]
async fn store_and_manifest_agree_through_edits_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.py", &numbered_lines(50, "alpha"));
    write_file(dir.path(), "b.py", &numbered_lines(30, "beta"));

    let config = small_config();
    let pool = db::connect(&Config::state_dir(dir.path())).await.unwrap();
    let store = SqliteVectorStore::new(pool.clone(), "code");
    let embedder = KeywordEmbedder;

    sync_index(dir.path(), &config, &store, &embedder, false, &NoProgress)
        .await
        .unwrap();

    // Edit one file, delete the other, add a third.
    write_file(dir.path(), "a.py", &numbered_lines(50, "alpha-v2"));
    std::fs::remove_file(dir.path().join("b.py")).unwrap();
    write_file(dir.path(), "c.py", &numbered_lines(20, "gamma"));

    let stats = sync_index(dir.path(), &config, &store, &embedder, false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(stats.added, 1);
    assert_eq!(stats.modified, 1);
    assert_eq!(stats.removed, 1);

    // Every manifest chunk id exists in the store and vice versa.
    let manifest = load_manifest(&Config::state_dir(dir.path())).unwrap();
    assert!(!manifest.files.contains_key("b.py"));
    let mut expected = manifest.all_chunk_ids();
    expected.sort();
    assert_eq!(store.ids().await.unwrap(), expected);

    pool.close().await;
}

#[tokio::test]
async fn reindexing_unchanged_files_reproduces_identical_chunk_ids() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.py", &numbered_lines(50, "alpha"));

    let config = small_config();
    let pool = db::connect(&Config::state_dir(dir.path())).await.unwrap();
    let store = SqliteVectorStore::new(pool.clone(), "code");
    let embedder = KeywordEmbedder;

    sync_index(dir.path(), &config, &store, &embedder, false, &NoProgress)
        .await
        .unwrap();
    let before = load_manifest(&Config::state_dir(dir.path())).unwrap();

    // Force re-embeds everything; ids must come out the same because
    // neither content nor chunking settings changed.
    sync_index(dir.path(), &config, &store, &embedder, true, &NoProgress)
        .await
        .unwrap();
    let after = load_manifest(&Config::state_dir(dir.path())).unwrap();

    assert_eq!(before.files["a.py"].chunk_ids, after.files["a.py"].chunk_ids);
    assert_eq!(
        store.count().await.unwrap(),
        after.total_chunks()
    );

    pool.close().await;
}

#[tokio::test]
async fn memory_and_code_collections_do_not_bleed() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.py", "def login(): pass\n");

    let config = small_config();
    let pool = db::connect(&Config::state_dir(dir.path())).await.unwrap();
    let code = SqliteVectorStore::new(pool.clone(), "code");
    let memory = SqliteVectorStore::new(pool.clone(), "memory");
    let embedder = KeywordEmbedder;

    sync_index(dir.path(), &config, &code, &embedder, false, &NoProgress)
        .await
        .unwrap();

    assert!(code.count().await.unwrap() > 0);
    assert_eq!(memory.count().await.unwrap(), 0);

    pool.close().await;
}
