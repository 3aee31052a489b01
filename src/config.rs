//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. API keys are never read from this file; providers name the
//! environment variable that holds them (`api_key_env`).
//!
//! ```toml
//! [db]
//! path = "./data/pdfchat.sqlite"
//!
//! [embedding]
//! provider = "gemini"
//! model = "text-embedding-004"
//! dims = 768
//!
//! [completion]
//! provider = "gemini"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pdfchat_core::answer::AnswerOptions;
use pdfchat_core::ocr::OcrPolicy;
use pdfchat_core::prompt::{FALLBACK_PREFIX, NOT_AVAILABLE_SENTINEL};

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ocr_command")]
    pub command: String,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_min_chars_per_page")]
    pub min_chars_per_page: f64,
    #[serde(default = "default_improvement_ratio")]
    pub improvement_ratio: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_ocr_command(),
            language: default_ocr_language(),
            min_chars_per_page: default_min_chars_per_page(),
            improvement_ratio: default_improvement_ratio(),
        }
    }
}

impl OcrConfig {
    pub fn policy(&self) -> OcrPolicy {
        OcrPolicy {
            min_chars_per_page: self.min_chars_per_page,
            improvement_ratio: self.improvement_ratio,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ocr_command() -> String {
    "ocrmypdf".to_string()
}
fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_min_chars_per_page() -> f64 {
    pdfchat_core::ocr::DEFAULT_MIN_CHARS_PER_PAGE
}
fn default_improvement_ratio() -> f64 {
    pdfchat_core::ocr::DEFAULT_IMPROVEMENT_RATIO
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_index_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

impl IndexingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

fn default_index_batch_size() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    5_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_batch_pause_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_top_k() -> usize {
    15
}
fn default_history_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_embed_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
            base_url: default_gemini_base_url(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    100
}
fn default_embed_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_fallback_temperature")]
    pub fallback_temperature: f32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            temperature: default_temperature(),
            fallback_temperature: default_fallback_temperature(),
            timeout_secs: default_completion_timeout_secs(),
            api_key_env: default_api_key_env(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_completion_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_fallback_temperature() -> f32 {
    0.7
}
fn default_completion_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    #[serde(default = "default_fallback_prefix")]
    pub fallback_prefix: String,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            sentinel: default_sentinel(),
            fallback_prefix: default_fallback_prefix(),
        }
    }
}

fn default_sentinel() -> String {
    NOT_AVAILABLE_SENTINEL.to_string()
}
fn default_fallback_prefix() -> String {
    FALLBACK_PREFIX.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Config {
    /// Answer-stream options assembled from `[answer]` and `[completion]`.
    pub fn answer_options(&self) -> AnswerOptions {
        AnswerOptions {
            sentinel: self.answer.sentinel.clone(),
            fallback_prefix: self.answer.fallback_prefix.clone(),
            temperature: Some(self.completion.temperature),
            fallback_temperature: Some(self.completion.fallback_temperature),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.ocr.min_chars_per_page < 0.0 {
        anyhow::bail!("ocr.min_chars_per_page must be >= 0");
    }
    if config.ocr.improvement_ratio < 1.0 {
        anyhow::bail!("ocr.improvement_ratio must be >= 1.0");
    }

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }
    if config.indexing.max_attempts == 0 {
        anyhow::bail!("indexing.max_attempts must be >= 1");
    }
    if config.indexing.max_delay_ms < config.indexing.base_delay_ms {
        anyhow::bail!("indexing.max_delay_ms must be >= indexing.base_delay_ms");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    if config.answer.sentinel.trim().is_empty() {
        anyhow::bail!("answer.sentinel must not be empty");
    }

    Ok(())
}
