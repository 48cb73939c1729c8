//! Data models for the retrieval pipeline.

use serde::Serialize;
use uuid::Uuid;

/// One page of raw text as emitted by the document loader.
///
/// Page indices are 0-based here; the ingestion pipeline normalizes them
/// to 1-based before anything is persisted.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Extracted page text.
    pub text: String,
    /// Source path as given to the loader.
    pub source: String,
    /// 0-based page index.
    pub page_index: usize,
}

/// A bounded-length text segment derived from a single page.
///
/// Immutable once created; the unit of indexing and retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Unique identifier for this chunk.
    pub id: Uuid,
    /// Base filename of the originating document.
    pub source: String,
    /// 1-based page number within the document.
    pub page: u32,
    /// Order of this chunk within the ingestion batch.
    pub chunk_index: u32,
    /// Character offset of the chunk within its page text.
    pub start_offset: usize,
    /// The chunk text.
    pub content: String,
}

impl Chunk {
    /// Create a new chunk with a generated ID.
    pub fn new(
        source: String,
        page: u32,
        chunk_index: u32,
        start_offset: usize,
        content: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            page,
            chunk_index,
            start_offset,
            content,
        }
    }
}

/// One retrieval hit: chunk text plus its provenance and distance score.
///
/// Lower score means a closer match. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// The matched chunk text.
    pub content: String,
    /// Base filename the chunk came from.
    pub source: String,
    /// 1-based page number. 0 means the metadata was missing.
    pub page: u32,
    /// Squared Euclidean distance to the query embedding.
    pub score: f32,
}

/// Provenance record returned to API clients alongside the answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source: String,
    pub page: u32,
    pub score: f32,
}

impl From<&RetrievalResult> for Citation {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            source: r.source.clone(),
            page: r.page,
            score: r.score,
        }
    }
}
