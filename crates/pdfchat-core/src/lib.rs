//! # pdfchat Core
//!
//! Shared logic for pdfchat: page and chunk models, chunk identity
//! assignment, the OCR decision policy, the vector store abstraction, the
//! embedding and completion traits, prompt construction, and the
//! retrieval-augmented answer stream.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP
//! dependencies. Concrete stores, service clients, PDF extraction and the
//! OCR subprocess live in the `pdfchat` app crate.

pub mod answer;
pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod models;
pub mod ocr;
pub mod prompt;
pub mod store;

pub use error::{Error, Result};
