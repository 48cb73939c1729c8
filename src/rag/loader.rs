//! PDF document loading.
//!
//! Parsing is delegated entirely to lopdf; this module only shapes its
//! output into per-page records for the ingestion pipeline.

use std::path::Path;

use lopdf::Document;
use thiserror::Error;

use super::models::PageRecord;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to parse document: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("document contains no extractable text")]
    EmptyDocument,
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Load a PDF into page records, in page order.
///
/// Page indices are 0-based; normalization to 1-based happens during
/// ingestion. Pages whose text cannot be extracted are skipped with a
/// warning. A document yielding no text at all is an error.
pub fn load_pdf(path: &Path) -> Result<Vec<PageRecord>> {
    let doc = Document::load(path)?;
    let source = path.to_string_lossy().into_owned();

    let mut records = Vec::new();
    for (i, (&page_number, _)) in doc.get_pages().iter().enumerate() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    log::debug!("{source}: page {page_number} has no text");
                    continue;
                }
                records.push(PageRecord {
                    text,
                    source: source.clone(),
                    page_index: i,
                });
            }
            Err(e) => {
                log::warn!("{source}: skipping page {page_number}: {e}");
            }
        }
    }

    if records.is_empty() {
        return Err(LoaderError::EmptyDocument);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-pdf.pdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"this is not a pdf").unwrap();

        match load_pdf(&path) {
            Err(LoaderError::Parse(_)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pdf");
        assert!(load_pdf(&path).is_err());
    }
}
