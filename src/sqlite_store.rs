//! SQLite-backed [`VectorStore`] implementation.
//!
//! Each record is one row of `index_records`, with its embedding stored as
//! a little-endian `f32` BLOB. The store owns an [`EmbeddingProvider`] and
//! embeds text on write and queries on search. Similarity search is
//! brute-force cosine over the rows that pass the metadata filter.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use pdfchat_core::embedding::{blob_to_vec, top_k_by_similarity, vec_to_blob, EmbeddingProvider};
use pdfchat_core::models::{ExtraMetadata, IndexRecord, SearchHit};
use pdfchat_core::store::VectorStore;
use pdfchat_core::{Error, Result};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embedder }
    }
}

fn store_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn write_err(e: sqlx::Error) -> Error {
    Error::StoreWrite(e.to_string())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT id FROM index_records")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
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

        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name();
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        for (record, vector) in records.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| Error::StoreWrite(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO index_records
                    (id, source_id, page_number, chunk_index, text, metadata_json,
                     embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&record.id)
            .bind(&record.source_id)
            .bind(record.page_number as i64)
            .bind(record.chunk_index as i64)
            .bind(&record.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(vector))
            .bind(model)
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
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

        let rows = sqlx::query(
            r#"
            SELECT id, source_id, page_number, chunk_index, text, metadata_json, embedding
            FROM index_records
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let candidates = rows.iter().filter_map(|row| {
            let metadata_json: String = row.get("metadata_json");
            let record = IndexRecord {
                id: row.get("id"),
                text: row.get("text"),
                source_id: row.get("source_id"),
                page_number: row.get::<i64, _>("page_number") as u32,
                chunk_index: row.get::<i64, _>("chunk_index") as u32,
                metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            };
            if !record.matches(filter) {
                return None;
            }
            let blob: Vec<u8> = row.get("embedding");
            Some((record, blob_to_vec(&blob)))
        });

        Ok(top_k_by_similarity(&query_vec, candidates, k)
            .into_iter()
            .map(|(record, score)| SearchHit { record, score })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM index_records")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_records")
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    /// Two-dimensional vectors: (mentions "rust", mentions "python").
    struct TopicEmbedder;

    #[async_trait]
    impl EmbeddingProvider for TopicEmbedder {
        fn model_name(&self) -> &str {
            "topics"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("rust") { 1.0 } else { 0.1 },
                        if t.contains("python") { 1.0 } else { 0.1 },
                    ]
                })
                .collect())
        }
    }

    fn record(id: &str, text: &str, conversation: &str) -> IndexRecord {
        let mut metadata = ExtraMetadata::new();
        metadata.insert("conversation_id".into(), conversation.into());
        IndexRecord {
            id: id.into(),
            text: text.into(),
            source_id: "doc.pdf".into(),
            page_number: 1,
            chunk_index: 0,
            metadata,
        }
    }

    async fn store() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&dir.path().join("t.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (dir, SqliteVectorStore::new(pool, Arc::new(TopicEmbedder)))
    }

    #[tokio::test]
    async fn test_upsert_and_existing_ids() {
        let (_dir, store) = store().await;
        store
            .upsert(&[record("a", "rust book", "c1"), record("b", "python book", "c1")])
            .await
            .unwrap();
        let ids = store.existing_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a") && ids.contains("b"));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_second_upsert_keeps_first_record() {
        let (_dir, store) = store().await;
        store.upsert(&[record("a", "rust first", "c1")]).await.unwrap();
        store.upsert(&[record("a", "python second", "c2")]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let mut filter = ExtraMetadata::new();
        filter.insert("conversation_id".into(), "c1".into());
        let hits = store.similarity_search("rust", 5, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.text, "rust first");
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let (_dir, store) = store().await;
        store
            .upsert(&[
                record("a", "rust ownership", "c1"),
                record("b", "python typing", "c1"),
                record("c", "rust traits", "c2"),
            ])
            .await
            .unwrap();

        let mut filter = ExtraMetadata::new();
        filter.insert("conversation_id".into(), "c1".into());
        let hits = store.similarity_search("rust", 5, &filter).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(hits[0].record.metadata["conversation_id"], "c1");
    }

    #[tokio::test]
    async fn test_reset_clears_records() {
        let (_dir, store) = store().await;
        store.upsert(&[record("a", "rust", "c1")]).await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.existing_ids().await.unwrap().is_empty());
    }
}
