//! Streaming text-completion trait.
//!
//! The answer pipeline only needs one capability from a language model:
//! take a prompt and yield text fragments as they are generated. Concrete
//! clients (Gemini, disabled) live in the `pdfchat` app crate.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A stream of generated text fragments. A fragment-level error ends the
/// generation; no further items are expected after it.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for streaming completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.0-flash-lite"`).
    fn model_name(&self) -> &str;

    /// Open a generation stream for `request`.
    ///
    /// Failing to open the stream is an
    /// [`Error::CompletionService`](crate::Error::CompletionService).
    async fn stream_generate(&self, request: &CompletionRequest) -> Result<CompletionStream>;
}
