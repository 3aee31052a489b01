//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`, keyed by id.
//! Search is brute-force cosine similarity over every stored vector.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::embedding::{top_k_by_similarity, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{ExtraMetadata, IndexRecord, SearchHit};

use super::VectorStore;

struct StoredRecord {
    record: IndexRecord,
    vector: Vec<f32>,
}

/// In-memory store backed by an embedding provider.
pub struct InMemoryStore {
    embedder: Arc<dyn EmbeddingProvider>,
    records: RwLock<BTreeMap<String, StoredRecord>>,
    writes: RwLock<usize>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            records: RwLock::new(BTreeMap::new()),
            writes: RwLock::new(0),
        }
    }

    /// Total number of records written across all successful upserts,
    /// counting overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.read().map(|w| *w).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Store("in-memory store lock poisoned".into())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.keys().cloned().collect())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        if vectors.len() != records.len() {
            return Err(Error::StoreWrite(format!(
                "embedding returned {} vectors for {} records",
                vectors.len(),
                records.len()
            )));
        }

        let mut stored = self
            .records
            .write()
            .map_err(|_| Error::StoreWrite("in-memory store lock poisoned".into()))?;
        let mut inserted = 0;
        for (record, vector) in records.iter().zip(vectors) {
            if let Entry::Vacant(slot) = stored.entry(record.id.clone()) {
                slot.insert(StoredRecord {
                    record: record.clone(),
                    vector,
                });
                inserted += 1;
            }
        }
        if let Ok(mut w) = self.writes.write() {
            *w += inserted;
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &ExtraMetadata,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector returned for query".into()))?;

        let stored = self.records.read().map_err(poisoned)?;
        let candidates = stored
            .values()
            .filter(|s| s.record.matches(filter))
            .map(|s| (&s.record, s.vector.clone()));

        Ok(top_k_by_similarity(&query_vec, candidates, k)
            .into_iter()
            .map(|(record, score)| SearchHit {
                record: record.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    async fn reset(&self) -> Result<()> {
        self.records.write().map_err(poisoned)?.clear();
        Ok(())
    }
}
