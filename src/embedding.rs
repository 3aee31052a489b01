//! Embedding provider implementations.
//!
//! Concrete [`EmbeddingProvider`]s for the vector stores:
//! - **[`DisabledProvider`]**: every call fails; used when embeddings are not configured.
//! - **[`GeminiProvider`]**: calls the Gemini `batchEmbedContents` API with batching and retry.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the provider named in config:
//!
//! ```rust,no_run
//! # use pdfchat::config::EmbeddingConfig;
//! # use pdfchat::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! Each HTTP call runs under a [`RetryPolicy`] with `max_retries + 1`
//! attempts starting at 1 s:
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - other HTTP 4xx: fail immediately
//! - network errors: retry

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use pdfchat_core::embedding::EmbeddingProvider;
use pdfchat_core::Error;

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

// ============ Disabled Provider ============

/// An embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"`. Ingestion still loads and
/// chunks files, but every batch write fails.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> pdfchat_core::Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("embedding provider is disabled".into()))
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API.
///
/// Calls `POST {base_url}/models/{model}:batchEmbedContents`, sending at
/// most `batch_size` texts per request. The API key is read from the
/// environment variable named by `api_key_env` when the provider is built.
pub struct GeminiProvider {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    batch_size: usize,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// the API key variable is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Gemini provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::new(
                config.max_retries + 1,
                Duration::from_secs(1),
                Duration::from_secs(32),
            ),
            client,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HttpFailure> {
        let model_path = format!("models/{}", self.model.trim_start_matches("models/"));
        let url = format!("{}/{}:batchEmbedContents", self.base_url, model_path);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| HttpFailure::retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| HttpFailure::retryable(e.to_string()))?;
            return parse_gemini_response(&json, texts.len()).map_err(HttpFailure::fatal);
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = format!("Gemini API error {}: {}", status, body_text);
        if status.as_u16() == 429 || status.is_server_error() {
            Err(HttpFailure::retryable(message))
        } else {
            Err(HttpFailure::fatal(message))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> pdfchat_core::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .retry
                .run_if("gemini embed", |_| self.embed_batch(batch), |e| e.retryable)
                .await
                .map_err(|e| Error::Embedding(e.message))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

/// An HTTP-level failure, tagged with whether a retry may help.
#[derive(Debug)]
struct HttpFailure {
    retryable: bool,
    message: String,
}

impl HttpFailure {
    fn retryable(message: String) -> Self {
        Self {
            retryable: true,
            message,
        }
    }

    fn fatal(message: String) -> Self {
        Self {
            retryable: false,
            message,
        }
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Extract `embeddings[].values` in order, checking the count.
fn parse_gemini_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    let items = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| "Invalid Gemini response: missing embeddings array".to_string())?;

    let mut embeddings = Vec::with_capacity(items.len());
    for item in items {
        let values = item
            .get("values")
            .and_then(|e| e.as_array())
            .ok_or_else(|| "Invalid Gemini response: missing values".to_string())?;
        embeddings.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    if embeddings.len() != expected {
        return Err(format!(
            "Gemini returned {} embeddings for {} texts",
            embeddings.len(),
            expected
        ));
    }
    Ok(embeddings)
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
