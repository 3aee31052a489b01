//! Retrieval-augmented answer stream with general-knowledge fallback.
//!
//! [`AnswerStreamer::stream`] turns a question, its retrieved context and
//! the conversation history into a stream of [`StreamEvent`]s:
//!
//! ```text
//! START ──► PRIMARY ──(sentinel in full answer)──► FALLBACK ──► DONE
//!              │                                       │
//!              └──────────(no sentinel)───────────────►┘
//!              any service error ──► ERROR
//! ```
//!
//! - `START` emits one `metadata` event naming the context chunk ids.
//! - `PRIMARY` streams the grounded answer as `rag_chunk` events while
//!   accumulating it.
//! - When the grounded stream ends, the accumulated text is checked for
//!   the not-available sentinel. If present, `fallback_start` carries the
//!   fallback prefix and `FALLBACK` streams a context-free answer as
//!   `fallback_chunk` events.
//! - `DONE` hands exactly one bot turn to the [`MessageSink`]: the grounded
//!   answer, or the prefix followed by the fallback answer.
//! - `ERROR` emits one `error` event and ends the stream. Nothing is
//!   persisted.
//!
//! The stream is lazy and owns its state. Dropping it before completion
//! cancels any in-flight generation and skips persistence.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::completion::{CompletionProvider, CompletionRequest, CompletionStream};
use crate::error::{Error, Result};
use crate::models::{ConversationTurn, IndexRecord, StreamEvent};
use crate::prompt::{fallback_prompt, grounded_prompt, FALLBACK_PREFIX, NOT_AVAILABLE_SENTINEL};

/// Receives the final bot answer once a stream completes successfully.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Persist one conversation turn. Failures are reported as
    /// [`Error::Persistence`] and do not affect the already-emitted stream.
    async fn create_message(&self, turn: &ConversationTurn) -> Result<()>;
}

/// Tunables for answer generation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOptions {
    pub sentinel: String,
    pub fallback_prefix: String,
    pub temperature: Option<f32>,
    pub fallback_temperature: Option<f32>,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            sentinel: NOT_AVAILABLE_SENTINEL.to_string(),
            fallback_prefix: FALLBACK_PREFIX.to_string(),
            temperature: Some(0.3),
            fallback_temperature: Some(0.7),
        }
    }
}

/// Everything needed to answer one question.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub conversation_id: String,
    pub question: String,
    /// Prior turns, oldest first.
    pub history: Vec<ConversationTurn>,
    /// Retrieved context, most relevant first.
    pub context: Vec<IndexRecord>,
}

/// Builds answer streams over a completion provider and a message sink.
#[derive(Clone)]
pub struct AnswerStreamer {
    completion: Arc<dyn CompletionProvider>,
    sink: Arc<dyn MessageSink>,
    options: AnswerOptions,
}

impl AnswerStreamer {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        sink: Arc<dyn MessageSink>,
        options: AnswerOptions,
    ) -> Self {
        Self {
            completion,
            sink,
            options,
        }
    }

    /// Start answering `request`. Nothing happens until the stream is polled.
    pub fn stream(&self, request: AnswerRequest) -> BoxStream<'static, StreamEvent> {
        let machine = Machine {
            ctx: Context {
                completion: self.completion.clone(),
                sink: self.sink.clone(),
                options: self.options.clone(),
                request,
            },
            phase: Phase::Start,
        };
        stream::unfold(machine, |mut m| async move {
            m.next_event().await.map(|event| (event, m))
        })
        .boxed()
    }
}

enum Phase {
    Start,
    Primary {
        stream: Option<CompletionStream>,
        buffer: String,
    },
    Fallback {
        stream: Option<CompletionStream>,
        buffer: String,
    },
    Finished,
}

struct Machine {
    ctx: Context,
    phase: Phase,
}

/// The immutable half of the machine, shared by reference across awaits.
struct Context {
    completion: Arc<dyn CompletionProvider>,
    sink: Arc<dyn MessageSink>,
    options: AnswerOptions,
    request: AnswerRequest,
}

impl Machine {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            // Any path that does not put a phase back ends the stream.
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Start => {
                    self.phase = Phase::Primary {
                        stream: None,
                        buffer: String::new(),
                    };
                    return Some(StreamEvent::Metadata {
                        conversation_id: self.ctx.request.conversation_id.clone(),
                        sources: self.ctx.request.context.iter().map(|r| r.id.clone()).collect(),
                    });
                }

                Phase::Primary { stream, mut buffer } => {
                    let mut stream = match stream {
                        Some(s) => s,
                        None => match self.ctx.open_grounded().await {
                            Ok(s) => s,
                            Err(e) => return Some(self.ctx.fail(e)),
                        },
                    };
                    match stream.next().await {
                        Some(Ok(fragment)) => {
                            buffer.push_str(&fragment);
                            self.phase = Phase::Primary {
                                stream: Some(stream),
                                buffer,
                            };
                            if fragment.is_empty() {
                                continue;
                            }
                            return Some(StreamEvent::RagChunk { content: fragment });
                        }
                        Some(Err(e)) => return Some(self.ctx.fail(e)),
                        None => {
                            if buffer.contains(&self.ctx.options.sentinel) {
                                tracing::debug!(
                                    conversation_id = %self.ctx.request.conversation_id,
                                    "grounded answer unavailable, switching to fallback"
                                );
                                self.phase = Phase::Fallback {
                                    stream: None,
                                    buffer: String::new(),
                                };
                                return Some(StreamEvent::FallbackStart {
                                    content: self.ctx.options.fallback_prefix.clone(),
                                });
                            }
                            self.ctx.persist(buffer).await;
                            return None;
                        }
                    }
                }

                Phase::Fallback { stream, mut buffer } => {
                    let mut stream = match stream {
                        Some(s) => s,
                        None => match self.ctx.open_fallback().await {
                            Ok(s) => s,
                            Err(e) => return Some(self.ctx.fail(e)),
                        },
                    };
                    match stream.next().await {
                        Some(Ok(fragment)) => {
                            buffer.push_str(&fragment);
                            self.phase = Phase::Fallback {
                                stream: Some(stream),
                                buffer,
                            };
                            if fragment.is_empty() {
                                continue;
                            }
                            return Some(StreamEvent::FallbackChunk { content: fragment });
                        }
                        Some(Err(e)) => return Some(self.ctx.fail(e)),
                        None => {
                            let content = format!("{}{}", self.ctx.options.fallback_prefix, buffer);
                            self.ctx.persist(content).await;
                            return None;
                        }
                    }
                }

                Phase::Finished => return None,
            }
        }
    }
}

impl Context {
    async fn open_grounded(&self) -> Result<CompletionStream> {
        let prompt = grounded_prompt(
            &self.request.history,
            &self.request.context,
            &self.request.question,
            &self.options.sentinel,
        );
        let request = CompletionRequest::new(prompt).with_temperature(self.options.temperature);
        self.completion.stream_generate(&request).await
    }

    async fn open_fallback(&self) -> Result<CompletionStream> {
        let prompt = fallback_prompt(&self.request.history, &self.request.question);
        let request =
            CompletionRequest::new(prompt).with_temperature(self.options.fallback_temperature);
        self.completion.stream_generate(&request).await
    }

    fn fail(&self, error: Error) -> StreamEvent {
        tracing::warn!(
            conversation_id = %self.request.conversation_id,
            error = %error,
            "answer stream failed"
        );
        StreamEvent::Error {
            content: format!("An error occurred: {}", error),
        }
    }

    async fn persist(&self, content: String) {
        let turn = ConversationTurn::bot(self.request.conversation_id.clone(), content);
        if let Err(e) = self.sink.create_message(&turn).await {
            tracing::warn!(
                conversation_id = %self.request.conversation_id,
                error = %e,
                "failed to persist answer"
            );
        }
    }
}
