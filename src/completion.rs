//! Streaming completion clients.
//!
//! - **[`DisabledCompletion`]**: every request fails; answer streams end
//!   with an `error` event.
//! - **[`GeminiCompletion`]**: `streamGenerateContent` over server-sent
//!   events, yielding each decoded text fragment as it arrives.
//!
//! The SSE body is decoded incrementally by [`SseDecoder`], which buffers
//! partial lines across network chunk boundaries.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use pdfchat_core::completion::{CompletionProvider, CompletionRequest, CompletionStream};
use pdfchat_core::Error;

use crate::config::CompletionConfig;

/// A completion provider that always fails.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn stream_generate(
        &self,
        _request: &CompletionRequest,
    ) -> pdfchat_core::Result<CompletionStream> {
        Err(Error::CompletionService(
            "completion provider is disabled".into(),
        ))
    }
}

/// Streaming client for Gemini `streamGenerateContent`.
pub struct GeminiCompletion {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiCompletion {
    /// # Errors
    ///
    /// Returns an error if the API key variable is not in the environment.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_key(config, api_key)
    }

    /// Build a client with an explicit key instead of the environment.
    pub fn with_key(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.trim_start_matches("models/").to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_generate(
        &self,
        request: &CompletionRequest,
    ) -> pdfchat_core::Result<CompletionStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let mut body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
        });
        if let Some(t) = request.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": t });
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::CompletionService(format!("stream request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::CompletionService(format!(
                "Gemini API error {}: {}",
                status, text
            )));
        }

        Ok(decode_sse(response.bytes_stream().boxed()))
    }
}

/// Turn a raw SSE byte stream into a stream of text fragments.
///
/// Transport errors and `error` payloads become a single terminal `Err`.
pub fn decode_sse<S, B, E>(bytes: S) -> CompletionStream
where
    S: futures::Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item.map_err(Error::CompletionService), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(chunk.as_ref());
                    state.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(Error::CompletionService(format!("stream error: {}", e))),
                        state,
                    ));
                }
                None => {
                    let decoded = state.decoder.finish();
                    state.pending.extend(decoded);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<std::result::Result<String, String>>,
    done: bool,
}

/// Incremental server-sent-events decoder for Gemini stream payloads.
///
/// Bytes are buffered until a full line is available, so a JSON payload
/// or a multi-byte character split across network chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the fragments of every completed line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<std::result::Result<String, String>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<std::result::Result<String, String>> {
        let line = std::mem::take(&mut self.buffer);
        parse_sse_line(&String::from_utf8_lossy(&line))
            .into_iter()
            .collect()
    }
}

/// Decode one SSE line. Non-`data:` lines and `[DONE]` yield nothing.
fn parse_sse_line(line: &str) -> Option<std::result::Result<String, String>> {
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(format!("malformed stream payload: {}", e))),
    };
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Some(Err(format!("Gemini stream error: {}", message)));
    }

    let text: String = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();
    Some(Ok(text))
}

/// Create the [`CompletionProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledCompletion`] |
/// | `"gemini"` | [`GeminiCompletion`] |
pub fn create_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "gemini" => Ok(Arc::new(GeminiCompletion::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}
