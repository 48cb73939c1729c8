//! Retrieval core: load, chunk, embed, index, search.

mod chunker;
mod engine;
mod index;
mod loader;
mod models;

pub use chunker::TextSplitter;
pub use engine::{format_context, RagEngine, RagError};
pub use index::{IndexStats, VectorIndex, VectorIndexError};
pub use loader::{load_pdf, LoaderError};
pub use models::{Chunk, Citation, PageRecord, RetrievalResult};
