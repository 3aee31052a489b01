//! Error taxonomy shared by the ingestion and answer pipelines.
//!
//! Each variant names the stage that failed. Most are handled locally by
//! the pipeline that raises them (a file is skipped, a batch is abandoned,
//! an answer stream ends with an `error` event); only [`Error::InvalidInput`]
//! and total store unavailability normally reach an end caller.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Native text extraction failed for a file.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The OCR engine was missing or exited unsuccessfully.
    #[error("OCR engine failed: {0}")]
    OcrEngine(String),

    /// A batch write to the vector store was rejected.
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// A read or search against the vector store failed.
    #[error("store unavailable: {0}")]
    Store(String),

    /// The embedding service could not embed the given texts.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The completion service failed to open or continue a stream.
    #[error("completion service error: {0}")]
    CompletionService(String),

    /// The persistence callback could not store the final answer.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The request itself was malformed (e.g. an empty question).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}
