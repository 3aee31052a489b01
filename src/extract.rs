//! Native per-page text extraction for PDF files.
//!
//! Extraction never panics into the caller: `pdf-extract` occasionally
//! panics on malformed fonts, so each call runs under `catch_unwind` and a
//! panic becomes an [`ExtractError::Panicked`]. The loader treats any
//! extraction error as "native produced nothing" and moves on to OCR.

use std::path::Path;

use pdfchat_core::models::PageDocument;
use thiserror::Error;

/// Native extraction failure for one file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("PDF extraction panicked: {0}")]
    Panicked(String),
}

/// Reads a file into one [`PageDocument`] per page.
pub trait PageExtractor: Send + Sync {
    /// Extract every page of `path`, labelling pages with `source_id` and
    /// 1-based page numbers. Pages without text are kept with empty text so
    /// the page count stays accurate.
    fn extract_pages(&self, path: &Path, source_id: &str) -> Result<Vec<PageDocument>, ExtractError>;
}

/// [`PageExtractor`] backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PageExtractor for PdfExtractor {
    fn extract_pages(&self, path: &Path, source_id: &str) -> Result<Vec<PageDocument>, ExtractError> {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_by_pages(path)
        }));

        let pages = match result {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => return Err(ExtractError::Pdf(e.to_string())),
            Err(payload) => {
                let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                return Err(ExtractError::Panicked(msg));
            }
        };

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageDocument::new(source_id, i as u32 + 1, text))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = PdfExtractor.extract_pages(&path, "broken.pdf").unwrap_err();
        assert!(err.to_string().contains("PDF extraction"));
    }

    #[test]
    fn missing_file_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pdf");
        assert!(PdfExtractor.extract_pages(&path, "absent.pdf").is_err());
    }
}
