//! Question answering over ingested documents.
//!
//! [`ask`] gathers everything the answer stream needs (history, the
//! user's turn, retrieved context) and hands off to
//! [`AnswerStreamer`]. Retrieval is scoped to the conversation: only
//! chunks ingested with the same `conversation_id` are considered.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;

use pdfchat_core::answer::{AnswerRequest, AnswerStreamer};
use pdfchat_core::models::{ConversationTurn, ExtraMetadata, IndexRecord, StreamEvent};
use pdfchat_core::Error;

use crate::config::Config;
use crate::services::Services;

/// Metadata key that scopes retrieval to a conversation.
pub const CONVERSATION_KEY: &str = "conversation_id";

/// Start answering `question` in `conversation_id`.
///
/// Fails up front only for an empty question or an unreachable message
/// store. A failed similarity search degrades to an empty context, which
/// sends the answer down the fallback path.
pub async fn ask(
    services: &Services,
    conversation_id: &str,
    question: &str,
) -> pdfchat_core::Result<BoxStream<'static, StreamEvent>> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".into()));
    }
    if conversation_id.trim().is_empty() {
        return Err(Error::InvalidInput("conversation_id must not be empty".into()));
    }

    let history = services
        .messages
        .history(conversation_id, services.config.retrieval.history_limit)
        .await?;
    services
        .messages
        .insert(&ConversationTurn::user(conversation_id, question))
        .await?;

    let context = retrieve(services, conversation_id, question).await;

    let streamer = AnswerStreamer::new(
        services.completion.clone(),
        Arc::new(services.messages.clone()),
        services.config.answer_options(),
    );
    Ok(streamer.stream(AnswerRequest {
        conversation_id: conversation_id.to_string(),
        question: question.to_string(),
        history,
        context,
    }))
}

async fn retrieve(services: &Services, conversation_id: &str, question: &str) -> Vec<IndexRecord> {
    let mut filter = ExtraMetadata::new();
    filter.insert(CONVERSATION_KEY.to_string(), conversation_id.to_string());

    match services
        .store
        .similarity_search(question, services.config.retrieval.top_k, &filter)
        .await
    {
        Ok(hits) => hits.into_iter().map(|h| h.record).collect(),
        Err(e) => {
            tracing::warn!(conversation_id, error = %e, "similarity search failed, answering without context");
            Vec::new()
        }
    }
}

/// `pdfchat ask`: stream the answer to stdout, one JSON event per line.
pub async fn run_ask(config: &Config, conversation_id: &str, question: &str) -> Result<()> {
    use std::io::Write;

    let services = Services::from_config(config.clone()).await?;
    let mut events = ask(&services, conversation_id, question).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        stdout.write_all(event.to_ndjson().as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

/// `pdfchat history`: print a conversation's turns.
pub async fn run_history(config: &Config, conversation_id: &str, limit: i64) -> Result<()> {
    let services = Services::from_config(config.clone()).await?;
    let turns = services.messages.history(conversation_id, limit).await?;
    if turns.is_empty() {
        println!("No messages in conversation {}.", conversation_id);
        return Ok(());
    }
    for turn in turns {
        println!(
            "[{}] {}: {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.sender_type.as_str(),
            turn.content
        );
    }
    Ok(())
}
