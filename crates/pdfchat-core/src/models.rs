//! Data models that flow through the ingestion and answer pipelines.
//!
//! Ingestion turns uploaded files into [`PageDocument`]s, splits those into
//! [`Chunk`]s with stable identities, and writes them to the vector store
//! as [`IndexRecord`]s. Answering reads [`ConversationTurn`]s and search
//! hits and emits [`StreamEvent`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to chunks at ingestion time
/// (e.g. `conversation_id`, `user_id`). Ordered so serialization is stable.
pub type ExtraMetadata = BTreeMap<String, String>;

/// Text of a single page of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    /// Identifies the originating file; stable across re-uploads of the same file.
    pub source_id: String,
    /// 1-based page number within the source.
    pub page_number: u32,
    pub text: String,
}

impl PageDocument {
    pub fn new(source_id: impl Into<String>, page_number: u32, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page_number,
            text: text.into(),
        }
    }

    /// Number of Unicode scalar values in the page text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Total character count across a set of pages.
pub fn total_chars(pages: &[PageDocument]) -> usize {
    pages.iter().map(PageDocument::char_count).sum()
}

/// A window of page text, the unit of retrieval.
///
/// `chunk_index` and `chunk_id` are filled in by
/// [`assign_chunk_ids`](crate::chunk::assign_chunk_ids).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    pub page_number: u32,
    pub chunk_index: u32,
    /// `"{source_id}:{page_number}:{chunk_index}"`.
    pub chunk_id: String,
    pub text: String,
    pub metadata: ExtraMetadata,
}

/// What the vector store persists for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub metadata: ExtraMetadata,
}

impl IndexRecord {
    /// Look up a metadata value by key. The positional fields are
    /// addressable as `source_id`, `page_number` and `chunk_index`.
    pub fn metadata_value(&self, key: &str) -> Option<String> {
        match key {
            "source_id" => Some(self.source_id.clone()),
            "page_number" => Some(self.page_number.to_string()),
            "chunk_index" => Some(self.chunk_index.to_string()),
            _ => self.metadata.get(key).cloned(),
        }
    }

    /// True when every `key = value` pair in `filter` matches this record.
    /// An empty filter matches everything.
    pub fn matches(&self, filter: &ExtraMetadata) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.metadata_value(k).as_deref() == Some(v.as_str()))
    }
}

impl From<&Chunk> for IndexRecord {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            text: chunk.text.clone(),
            source_id: chunk.source_id.clone(),
            page_number: chunk.page_number,
            chunk_index: chunk.chunk_index,
            metadata: chunk.metadata.clone(),
        }
    }
}

/// A record returned from similarity search, with its cosine score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: IndexRecord,
    pub score: f32,
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Bot,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Bot => "bot",
        }
    }

    /// Parses the stored form. Anything other than `"user"` is a bot turn.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("user") {
            SenderType::User
        } else {
            SenderType::Bot
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_type: SenderType::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn bot(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_type: SenderType::Bot,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An event emitted by the answer stream.
///
/// Serialized with an internal `type` tag, one JSON object per line when
/// sent over the wire:
///
/// ```json
/// {"type":"rag_chunk","content":"The capital"}
/// {"type":"fallback_start","content":"Couldn't find answer in context provided.\n..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Describes the answer about to be streamed: the conversation and the
    /// chunk ids used as context.
    Metadata {
        conversation_id: String,
        sources: Vec<String>,
    },
    /// A fragment of the context-grounded answer.
    RagChunk { content: String },
    /// The grounded answer was the not-available sentinel; carries the
    /// fixed prefix that introduces the general answer.
    FallbackStart { content: String },
    /// A fragment of the general, context-free answer.
    FallbackChunk { content: String },
    /// The stream failed; no further events follow.
    Error { content: String },
}

impl StreamEvent {
    /// Serialize as a single newline-terminated JSON line.
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","content":"serialization failed: {}"}}"#, e)
        });
        line.push('\n');
        line
    }
}
