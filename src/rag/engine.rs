//! Ingestion and retrieval orchestration.
//!
//! The engine owns the embedder and the index state. Embedding and chat
//! calls happen outside the index lock; index mutation and search happen
//! inside it, so concurrent ingestion is serialized rather than racing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::config::Settings;
use crate::embeddings::{Embedder, EmbeddingError};

use super::chunker::TextSplitter;
use super::index::{IndexStats, VectorIndex, VectorIndexError};
use super::loader::{self, LoaderError};
use super::models::{Chunk, PageRecord, RetrievalResult};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("document load failed: {0}")]
    Loader(#[from] LoaderError),

    #[error("vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("index lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, RagError>;

/// Explicit index lifecycle. "Never created" and "failed to load" are
/// distinct states and callers see them differently: the former is a
/// valid empty corpus, the latter an error.
enum IndexState {
    Uninitialized,
    Loaded(VectorIndex),
    LoadFailed(String),
}

/// The retrieval core: load, chunk, embed, index, search.
pub struct RagEngine {
    db_path: PathBuf,
    splitter: TextSplitter,
    embedder: Box<dyn Embedder>,
    index: Mutex<IndexState>,
}

impl RagEngine {
    pub fn new(
        db_path: PathBuf,
        chunk_size: usize,
        chunk_overlap: usize,
        embedder: Box<dyn Embedder>,
    ) -> Self {
        Self {
            db_path,
            splitter: TextSplitter::new(chunk_size, chunk_overlap),
            embedder,
            index: Mutex::new(IndexState::Uninitialized),
        }
    }

    pub fn from_settings(settings: &Settings, embedder: Box<dyn Embedder>) -> Self {
        Self::new(
            settings.index_db_path(),
            settings.chunk_size,
            settings.chunk_overlap,
            embedder,
        )
    }

    /// Ingest a PDF: parse, chunk, embed, persist. Returns chunks added.
    ///
    /// Ingesting the same file twice adds both batches; nothing is
    /// deduplicated.
    pub async fn ingest(&self, path: &Path) -> Result<usize> {
        let pages = loader::load_pdf(path)?;
        let source = base_name(path);
        self.ingest_pages(&source, &pages).await
    }

    /// Ingest pre-parsed pages under the given source name.
    ///
    /// Page indices in the records are 0-based and are normalized to
    /// 1-based page numbers here, before anything is persisted.
    pub async fn ingest_pages(&self, source: &str, pages: &[PageRecord]) -> Result<usize> {
        let chunks = self.chunk_pages(source, pages);
        if chunks.is_empty() {
            return Err(RagError::Loader(LoaderError::EmptyDocument));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let mut state = self.index.lock().map_err(|_| RagError::LockPoisoned)?;
        let index = open_or_create(&mut state, &self.db_path)?;
        let added = index.add_chunks(&chunks, &embeddings)?;
        log::info!(
            "indexed {added} chunks from {source} into {}",
            index.db_path().display()
        );
        Ok(added)
    }

    /// Retrieve the k closest chunks for a query, closest first.
    ///
    /// A corpus with nothing indexed yet yields an empty list, not an
    /// error. An index that exists but fails to open is an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if !self.ensure_loaded()? {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let state = self.index.lock().map_err(|_| RagError::LockPoisoned)?;
        match &*state {
            IndexState::Loaded(index) => Ok(index.search(&query_vec, k.max(1))?),
            IndexState::Uninitialized => Ok(Vec::new()),
            IndexState::LoadFailed(reason) => Err(RagError::IndexUnavailable(reason.clone())),
        }
    }

    /// Index statistics, or None when nothing has been indexed yet.
    pub fn stats(&self) -> Result<Option<IndexStats>> {
        if !self.ensure_loaded()? {
            return Ok(None);
        }
        let state = self.index.lock().map_err(|_| RagError::LockPoisoned)?;
        match &*state {
            IndexState::Loaded(index) => Ok(Some(index.stats()?)),
            _ => Ok(None),
        }
    }

    fn chunk_pages(&self, source: &str, pages: &[PageRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index = 0u32;
        for page in pages {
            let page_number = (page.page_index + 1) as u32;
            for (content, start_offset) in self.splitter.split_with_offsets(&page.text) {
                chunks.push(Chunk::new(
                    source.to_string(),
                    page_number,
                    chunk_index,
                    start_offset,
                    content,
                ));
                chunk_index += 1;
            }
        }
        chunks
    }

    /// Resolve the index state for a read path. False means the index was
    /// never created, which callers treat as an empty corpus.
    fn ensure_loaded(&self) -> Result<bool> {
        let mut state = self.index.lock().map_err(|_| RagError::LockPoisoned)?;
        match &*state {
            IndexState::Loaded(_) => Ok(true),
            IndexState::LoadFailed(reason) => Err(RagError::IndexUnavailable(reason.clone())),
            IndexState::Uninitialized => {
                if !self.db_path.exists() {
                    return Ok(false);
                }
                match VectorIndex::open(&self.db_path) {
                    Ok(index) => {
                        *state = IndexState::Loaded(index);
                        Ok(true)
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        *state = IndexState::LoadFailed(reason.clone());
                        Err(RagError::IndexUnavailable(reason))
                    }
                }
            }
        }
    }
}

fn open_or_create<'a>(
    state: &'a mut IndexState,
    db_path: &Path,
) -> Result<&'a mut VectorIndex> {
    if !matches!(state, IndexState::Loaded(_)) {
        match VectorIndex::open(db_path) {
            Ok(index) => *state = IndexState::Loaded(index),
            Err(e) => {
                *state = IndexState::LoadFailed(e.to_string());
                return Err(RagError::Index(e));
            }
        }
    }
    match state {
        IndexState::Loaded(index) => Ok(index),
        _ => Err(RagError::IndexUnavailable("index not loaded".to_string())),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Render retrieval results as the labeled context string handed to the
/// answer generator. Purely presentational.
pub fn format_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| {
            let source = if r.source.is_empty() {
                "unknown"
            } else {
                r.source.as_str()
            };
            let page = if r.page == 0 {
                "?".to_string()
            } else {
                r.page.to_string()
            };
            format!("[{source}:{page}] (score={:.3})\n{}", r.score, r.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str, page: u32, score: f32, content: &str) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            source: source.to_string(),
            page,
            score,
        }
    }

    #[test]
    fn test_format_context_two_blocks_one_separator() {
        let results = vec![
            result("a.pdf", 1, 0.1234, "first passage"),
            result("b.pdf", 7, 1.5, "second passage"),
        ];
        let context = format_context(&results);

        assert_eq!(context.matches("\n\n---\n\n").count(), 1);
        let blocks: Vec<&str> = context.split("\n\n---\n\n").collect();
        assert!(blocks[0].starts_with("[a.pdf:1] (score=0.123)"));
        assert!(blocks[0].ends_with("first passage"));
        assert!(blocks[1].starts_with("[b.pdf:7] (score=1.500)"));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_format_context_defensive_fallbacks() {
        let results = vec![result("", 0, 0.5, "orphan chunk")];
        let context = format_context(&results);
        assert!(context.starts_with("[unknown:?] (score=0.500)"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/tmp/uploads/a.pdf")), "a.pdf");
        assert_eq!(base_name(Path::new("a.pdf")), "a.pdf");
    }
}
