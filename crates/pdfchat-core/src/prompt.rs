//! Prompt templates for grounded and fallback answers.

use crate::models::{ConversationTurn, IndexRecord, SenderType};

/// Phrase the grounded prompt tells the model to produce when the context
/// does not contain the answer. Detection is a plain substring match.
pub const NOT_AVAILABLE_SENTINEL: &str = "Answer is not available in the context";

/// Text that introduces a general (context-free) answer, both as the
/// `fallback_start` event and at the head of the persisted message.
pub const FALLBACK_PREFIX: &str = "Couldn't find answer in context provided.\nResponse from Gemini:\n";

/// Render prior turns one per line as `Role: content`.
pub fn render_history(history: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in history {
        let role = match turn.sender_type {
            SenderType::User => "User",
            SenderType::Bot => "bot",
        };
        out.push_str(role);
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out
}

/// Join retrieved record texts with blank lines.
pub fn render_context(records: &[IndexRecord]) -> String {
    records
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt asking for an answer grounded only in `context`.
///
/// `sentinel` is the exact phrase the model is told to reply with when the
/// context lacks the answer; callers detect it with the same value.
pub fn grounded_prompt(
    history: &[ConversationTurn],
    context: &[IndexRecord],
    question: &str,
    sentinel: &str,
) -> String {
    format!(
        "You are an expert RAG assistant. Answer the question as detailed as possible \
using only the provided context and the previous conversation. \
If the answer is not in the provided context, just say, \"{sentinel}\". \
Don't provide the wrong answer.\n\n\
Previous conversation:\n{history}\n\
Context from documents:\n{context}\n\n\
Question: {question}\n\n\
Answer:",
        sentinel = sentinel,
        history = render_history(history),
        context = render_context(context),
        question = question,
    )
}

/// Prompt for a general answer with no document context.
pub fn fallback_prompt(history: &[ConversationTurn], question: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the question as detailed as possible.\n\n\
Previous conversation:\n{history}\n\
Question: {question}\n\n\
Answer:",
        history = render_history(history),
        question = question,
    )
}
