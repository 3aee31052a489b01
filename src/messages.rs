//! Conversation turns in SQLite.
//!
//! [`SqliteMessageStore`] is the production [`MessageSink`]: the answer
//! stream hands it exactly one bot turn per successful answer. It also
//! serves conversation history to the chat service.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use pdfchat_core::answer::MessageSink;
use pdfchat_core::models::{ConversationTurn, SenderType};
use pdfchat_core::{Error, Result};

#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store one turn under a fresh id. Timestamps are fixed-width UTC so
    /// they sort lexically.
    pub async fn insert(&self, turn: &ConversationTurn) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_type, content, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&turn.conversation_id)
        .bind(turn.sender_type.as_str())
        .bind(&turn.content)
        .bind(turn.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    /// The most recent `limit` turns of a conversation, oldest first.
    pub async fn history(&self, conversation_id: &str, limit: i64) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, sender_type, content, timestamp
            FROM messages
            WHERE conversation_id = ?
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        let mut turns: Vec<ConversationTurn> = rows
            .iter()
            .map(|row| {
                let ts: String = row.get("timestamp");
                let sender: String = row.get("sender_type");
                ConversationTurn {
                    conversation_id: row.get("conversation_id"),
                    sender_type: SenderType::parse(&sender),
                    content: row.get("content"),
                    timestamp: DateTime::parse_from_rfc3339(&ts)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }
}

#[async_trait]
impl MessageSink for SqliteMessageStore {
    async fn create_message(&self, turn: &ConversationTurn) -> Result<()> {
        self.insert(turn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn store() -> (tempfile::TempDir, SqliteMessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&dir.path().join("m.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (dir, SqliteMessageStore::new(pool))
    }

    #[tokio::test]
    async fn test_history_oldest_first_and_limited() {
        let (_dir, store) = store().await;
        for i in 0..4 {
            store
                .insert(&ConversationTurn::user("c1", format!("q{}", i)))
                .await
                .unwrap();
        }
        store.insert(&ConversationTurn::bot("c2", "other")).await.unwrap();

        let all = store.history("c1", 50).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q0", "q1", "q2", "q3"]);

        let latest = store.history("c1", 2).await.unwrap();
        let contents: Vec<&str> = latest.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q2", "q3"]);
    }

    #[tokio::test]
    async fn test_sink_persists_bot_turn() {
        let (_dir, store) = store().await;
        store
            .create_message(&ConversationTurn::bot("c1", "answer"))
            .await
            .unwrap();
        let turns = store.history("c1", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].sender_type, SenderType::Bot);
    }
}
