//! # pdfchat
//!
//! Chat with PDF documents. Uploaded PDFs are read page by page (falling
//! back to OCR for scanned files), split into overlapping chunks, and
//! indexed incrementally into a SQLite-backed vector store. Questions are
//! answered by a streamed, retrieval-grounded completion that falls back
//! to an ungrounded answer when the documents don't contain one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │  Loader  │──▶│  Splitter │──▶│  Indexer │──▶│  SQLite  │
//! │ PDF/OCR  │   │ 800 / 80  │   │ batches  │   │ vectors  │
//! └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                    │
//!                         ┌──────────────────────────┤
//!                         ▼                          ▼
//!                    ┌──────────┐              ┌──────────┐
//!                    │   CLI    │              │   HTTP   │
//!                    │ pdfchat  │              │ NDJSON   │
//!                    └──────────┘              └──────────┘
//! ```
//!
//! Domain types, the OCR decision, chunk identity, and the answer state
//! machine live in `pdfchat-core`; this crate supplies the I/O around them.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | Database connection and schema |
//! | [`extract`] / [`ocr`] / [`loader`] | PDF text extraction with OCR fallback |
//! | [`index`] | Incremental, batched, retried indexing |
//! | [`sqlite_store`] | SQLite [`VectorStore`](pdfchat_core::store::VectorStore) |
//! | [`messages`] | Conversation history |
//! | [`embedding`] / [`completion`] | Gemini clients |
//! | [`ingest`] / [`chat`] | End-to-end operations |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod messages;
pub mod migrate;
pub mod ocr;
pub mod retry;
pub mod server;
pub mod services;
pub mod sqlite_store;
