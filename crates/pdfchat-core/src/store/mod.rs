//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the indexer and the answer
//! pipeline need from persistent chunk storage. Stores own their embedding
//! provider: callers hand over text and get text back.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ExtraMetadata, IndexRecord, SearchHit};

/// Abstract chunk store with similarity search.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`existing_ids`](VectorStore::existing_ids) | Every id currently stored |
/// | [`upsert`](VectorStore::upsert) | Embed and write a batch, keyed by id; existing ids are kept |
/// | [`similarity_search`](VectorStore::similarity_search) | Top-k records for a query, with equality filter |
/// | [`count`](VectorStore::count) | Number of stored records |
/// | [`reset`](VectorStore::reset) | Delete every record |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the ids of all stored records.
    async fn existing_ids(&self) -> Result<HashSet<String>>;

    /// Embed and write a batch of records. A record whose id is already
    /// stored is skipped; the stored copy is never overwritten.
    ///
    /// The batch is all-or-nothing: on error nothing from it is stored.
    /// Failures are [`Error::StoreWrite`](crate::Error::StoreWrite).
    async fn upsert(&self, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `k` records most similar to `query` among those
    /// matching every `key = value` pair in `filter`.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &ExtraMetadata,
    ) -> Result<Vec<SearchHit>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Remove every record.
    async fn reset(&self) -> Result<()>;
}
