//! Incremental indexer.
//!
//! Writes chunks to a [`VectorStore`] without ever rewriting one that is
//! already stored:
//!
//! 1. Read the set of stored ids once.
//! 2. Drop every chunk whose id is already stored (or repeated in the input).
//! 3. Write the rest in fixed-size batches, each under the [`RetryPolicy`],
//!    pausing briefly between batches to stay under provider rate limits.
//! 4. A batch that exhausts its retries is recorded and skipped; later
//!    batches still run.
//!
//! Re-running over the same chunks therefore performs zero writes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use pdfchat_core::models::{Chunk, IndexRecord};
use pdfchat_core::store::VectorStore;
use pdfchat_core::Result;

use crate::config::IndexingConfig;
use crate::retry::RetryPolicy;

/// A batch that could not be written after all retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBatch {
    pub ids: Vec<String>,
    pub error: String,
}

/// Counters from one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    /// Chunks offered to the indexer.
    pub total: usize,
    /// Chunks skipped because their id was already stored or repeated.
    pub already_indexed: usize,
    /// Chunks written by this run.
    pub inserted: usize,
    pub failed_batches: Vec<FailedBatch>,
}

impl IndexReport {
    pub fn failed_chunks(&self) -> usize {
        self.failed_batches.iter().map(|b| b.ids.len()).sum()
    }
}

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    retry: RetryPolicy,
    batch_pause: Duration,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        retry: RetryPolicy,
        batch_pause: Duration,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            retry,
            batch_pause,
        }
    }

    pub fn from_config(store: Arc<dyn VectorStore>, config: &IndexingConfig) -> Self {
        Self::new(
            store,
            config.batch_size,
            config.retry_policy(),
            config.batch_pause(),
        )
    }

    /// Index `chunks`, returning what was written, skipped, and abandoned.
    ///
    /// Fails only if the stored id set cannot be read; individual batch
    /// failures are reported in [`IndexReport::failed_batches`].
    pub async fn index(&self, chunks: &[Chunk]) -> Result<IndexReport> {
        let mut report = IndexReport {
            total: chunks.len(),
            ..IndexReport::default()
        };
        if chunks.is_empty() {
            return Ok(report);
        }

        let mut seen: HashSet<String> = self.store.existing_ids().await?;
        let pending: Vec<IndexRecord> = chunks
            .iter()
            .filter(|c| seen.insert(c.chunk_id.clone()))
            .map(IndexRecord::from)
            .collect();
        report.already_indexed = chunks.len() - pending.len();

        tracing::info!(
            total = report.total,
            already_indexed = report.already_indexed,
            new = pending.len(),
            "indexing chunks"
        );

        let batches: Vec<&[IndexRecord]> = pending.chunks(self.batch_size).collect();
        let batch_count = batches.len();
        for (i, batch) in batches.into_iter().enumerate() {
            let outcome = self
                .retry
                .run("index batch", |_| self.store.upsert(batch))
                .await;
            match outcome {
                Ok(()) => report.inserted += batch.len(),
                Err(e) => {
                    tracing::error!(
                        batch = i + 1,
                        of = batch_count,
                        error = %e,
                        "batch failed after retries, skipping"
                    );
                    report.failed_batches.push(FailedBatch {
                        ids: batch.iter().map(|r| r.id.clone()).collect(),
                        error: e.to_string(),
                    });
                }
            }
            if i + 1 < batch_count && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pdfchat_core::chunk::Splitter;
    use pdfchat_core::models::{ExtraMetadata, PageDocument, SearchHit};
    use pdfchat_core::Error;
    use std::sync::Mutex;

    /// Records writes; fails the first `fail_first` upsert calls.
    #[derive(Default)]
    struct RecordingStore {
        ids: Mutex<HashSet<String>>,
        batches: Mutex<Vec<Vec<String>>>,
        calls: Mutex<usize>,
        fail_first: usize,
        always_fail_ids: HashSet<String>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn existing_ids(&self) -> Result<HashSet<String>> {
            Ok(self.ids.lock().unwrap().clone())
        }

        async fn upsert(&self, records: &[IndexRecord]) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.fail_first {
                return Err(Error::StoreWrite("rate limited".into()));
            }
            if records.iter().any(|r| self.always_fail_ids.contains(&r.id)) {
                return Err(Error::StoreWrite("rejected".into()));
            }
            let mut ids = self.ids.lock().unwrap();
            for r in records {
                assert!(ids.insert(r.id.clone()), "id {} written twice", r.id);
            }
            self.batches
                .lock()
                .unwrap()
                .push(records.iter().map(|r| r.id.clone()).collect());
            Ok(())
        }

        async fn similarity_search(
            &self,
            _query: &str,
            _k: usize,
            _filter: &ExtraMetadata,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.ids.lock().unwrap().len())
        }

        async fn reset(&self) -> Result<()> {
            self.ids.lock().unwrap().clear();
            Ok(())
        }
    }

    fn chunks(pages: usize) -> Vec<Chunk> {
        let docs: Vec<PageDocument> = (1..=pages)
            .map(|p| PageDocument::new("doc.pdf", p as u32, format!("page {} text", p)))
            .collect();
        Splitter::default().split_pages(&docs, &ExtraMetadata::new())
    }

    fn indexer(store: Arc<RecordingStore>) -> Indexer {
        Indexer::new(store, 5, RetryPolicy::default(), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_of_five() {
        let store = Arc::new(RecordingStore::default());
        let report = indexer(store.clone()).index(&chunks(12)).await.unwrap();
        assert_eq!(report.inserted, 12);
        assert_eq!(report.already_indexed, 0);
        let sizes: Vec<usize> = store.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reindex_writes_nothing() {
        let store = Arc::new(RecordingStore::default());
        let idx = indexer(store.clone());
        idx.index(&chunks(7)).await.unwrap();
        let second = idx.index(&chunks(7)).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_indexed, 7);
        assert_eq!(*store.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_new_chunks_written() {
        let store = Arc::new(RecordingStore::default());
        let idx = indexer(store.clone());
        idx.index(&chunks(3)).await.unwrap();
        let report = idx.index(&chunks(4)).await.unwrap();
        assert_eq!(report.inserted, 1);
        let last = store.batches.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last, vec!["doc.pdf:4:0".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_in_input_written_once() {
        let store = Arc::new(RecordingStore::default());
        let mut input = chunks(2);
        input.push(input[0].clone());
        let report = indexer(store).index(&input).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.already_indexed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried() {
        let store = Arc::new(RecordingStore {
            fail_first: 2,
            ..RecordingStore::default()
        });
        let report = indexer(store.clone()).index(&chunks(3)).await.unwrap();
        assert_eq!(report.inserted, 3);
        assert!(report.failed_batches.is_empty());
        assert_eq!(*store.calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_batch_skipped_others_continue() {
        let store = Arc::new(RecordingStore {
            always_fail_ids: ["doc.pdf:2:0".to_string()].into_iter().collect(),
            ..RecordingStore::default()
        });
        let report = indexer(store.clone()).index(&chunks(10)).await.unwrap();
        assert_eq!(report.failed_batches.len(), 1);
        assert_eq!(report.failed_chunks(), 5);
        assert_eq!(report.inserted, 5);
        // 5 attempts for the failing batch, 1 for the other
        assert_eq!(*store.calls.lock().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let store = Arc::new(RecordingStore::default());
        let report = indexer(store.clone()).index(&[]).await.unwrap();
        assert_eq!(report, IndexReport::default());
        assert_eq!(*store.calls.lock().unwrap(), 0);
    }
}
