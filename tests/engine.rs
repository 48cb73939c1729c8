//! End-to-end tests for the retrieval engine with a deterministic
//! in-process embedder.

use async_trait::async_trait;

use docqa::embeddings::{Embedder, EmbeddingError};
use docqa::rag::{PageRecord, RagEngine};

/// Deterministic embedder: buckets byte values into a fixed-length
/// normalized histogram. No network, stable across runs.
struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| fake_vector(t)).collect())
    }
}

fn fake_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; 8];
    for b in text.bytes() {
        v[b as usize % 8] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
    v.iter().map(|x| x / norm).collect()
}

fn engine_in(dir: &tempfile::TempDir, chunk_size: usize, chunk_overlap: usize) -> RagEngine {
    RagEngine::new(
        dir.path().join("index.sqlite3"),
        chunk_size,
        chunk_overlap,
        Box::new(FakeEmbedder),
    )
}

fn page(text: &str, page_index: usize) -> PageRecord {
    PageRecord {
        text: text.to_string(),
        source: "ignored-raw-path.pdf".to_string(),
        page_index,
    }
}

fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("w{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn retrieve_before_any_ingest_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 1000, 150);

    let results = engine.retrieve("anything", 5).await.unwrap();
    assert!(results.is_empty());
    assert!(engine.stats().unwrap().is_none());
}

#[tokio::test]
async fn one_and_a_half_page_document_yields_two_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 1000, 150);

    let mut text = words(330);
    text.truncate(1500);
    let added = engine
        .ingest_pages("a.pdf", &[page(&text, 0)])
        .await
        .unwrap();
    assert_eq!(added, 2);

    let results = engine.retrieve("any query", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, "a.pdf");
    assert_eq!(results[0].page, 1);
}

#[tokio::test]
async fn double_ingestion_doubles_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 100, 20);

    let text = words(100);
    let first = engine
        .ingest_pages("a.pdf", &[page(&text, 0)])
        .await
        .unwrap();
    let second = engine
        .ingest_pages("a.pdf", &[page(&text, 0)])
        .await
        .unwrap();

    assert_eq!(first, second);
    let stats = engine.stats().unwrap().unwrap();
    assert_eq!(stats.chunk_count, (first + second) as u64);
    assert_eq!(stats.document_count, 1);
}

#[tokio::test]
async fn pages_are_normalized_to_one_based() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 1000, 100);

    engine
        .ingest_pages(
            "doc.pdf",
            &[page("first page text", 0), page("second page text", 1)],
        )
        .await
        .unwrap();

    let results = engine.retrieve("page text", 10).await.unwrap();
    assert_eq!(results.len(), 2);
    let mut pages: Vec<u32> = results.iter().map(|r| r.page).collect();
    pages.sort_unstable();
    assert_eq!(pages, vec![1, 2]);
    assert!(results.iter().all(|r| r.page >= 1));
}

#[tokio::test]
async fn retrieve_returns_k_results_in_score_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 60, 10);

    let text = words(60);
    let added = engine
        .ingest_pages("big.pdf", &[page(&text, 0)])
        .await
        .unwrap();
    assert!(added >= 3, "expected at least 3 chunks, got {added}");

    let results = engine.retrieve("w1 w2 w3", 3).await.unwrap();
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[tokio::test]
async fn accented_text_is_chunked_and_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 40, 10);

    // Chunks starting on multibyte characters must not break offset
    // tracking during ingest.
    let text = format!("{} {} {}", "é".repeat(30), "日本語のテキスト".repeat(5), "ü".repeat(30));
    let added = engine
        .ingest_pages("accents.pdf", &[page(&text, 0)])
        .await
        .unwrap();
    assert!(added > 1, "expected multiple chunks, got {added}");

    let results = engine.retrieve("テキスト", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source, "accents.pdf");
}

#[tokio::test]
async fn corrupt_index_file_is_an_error_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.sqlite3"), b"not a sqlite file").unwrap();

    let engine = engine_in(&dir, 1000, 100);
    assert!(engine.stats().is_err());
    assert!(engine.retrieve("anything", 3).await.is_err());
}

#[tokio::test]
async fn blank_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, 1000, 100);

    let err = engine
        .ingest_pages("blank.pdf", &[page("   \n\n  ", 0)])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no extractable text"));
}

#[tokio::test]
async fn index_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let engine = engine_in(&dir, 1000, 100);
        engine
            .ingest_pages("a.pdf", &[page("persistent content here", 0)])
            .await
            .unwrap();
    }

    let engine = engine_in(&dir, 1000, 100);
    let results = engine.retrieve("persistent content", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, "a.pdf");
}
