//! PDF question answering over a local retrieval index.
//!
//! Documents are parsed into pages, chunked, embedded over HTTP, and
//! stored in a SQLite-backed vector index. Questions are answered by
//! retrieving the closest chunks and handing them to a chat backend
//! together with the question.

pub mod config;
pub mod embeddings;
pub mod llm;
pub mod rag;
pub mod server;

use config::Settings;
use llm::LlmClient;
use rag::RagEngine;

/// Shared application context handed to request handlers.
///
/// Constructed once at startup; replaces any notion of process-global
/// embedding or index handles.
pub struct AppState {
    pub settings: Settings,
    pub engine: RagEngine,
    pub llm: LlmClient,
}
