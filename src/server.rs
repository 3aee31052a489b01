//! HTTP server for uploads and streamed chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ingest` | Multipart upload: `file` parts plus optional `conversation_id`, `user_id` |
//! | `POST` | `/api/chat` | `{conversation_id, question}` → NDJSON event stream |
//! | `GET`  | `/api/conversations/{id}/messages` | Conversation history |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Streaming
//!
//! `/api/chat` responds with `application/x-ndjson`, one event per line:
//!
//! ```text
//! {"type":"metadata","conversation_id":"c1","sources":["report.pdf:3:0"]}
//! {"type":"rag_chunk","content":"The capital of France "}
//! {"type":"rag_chunk","content":"is Paris."}
//! ```
//!
//! If the client disconnects, the event stream is dropped and the answer
//! is not persisted.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! on another origin can call the API.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use pdfchat_core::models::{ConversationTurn, ExtraMetadata};

use crate::chat::{self, CONVERSATION_KEY};
use crate::config::Config;
use crate::ingest::{ingest_uploads, IngestReport};
use crate::loader::Upload;
use crate::services::Services;

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Build the router over already-constructed services.
pub fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ingest", post(handle_ingest))
        .route("/api/chat", post(handle_chat))
        .route("/api/conversations/{id}/messages", get(handle_messages))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { services })
}

/// `pdfchat serve`: bind `[server].bind` and serve until stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Arc::new(Services::from_config(config.clone()).await?);
    let app = router(services);

    println!("pdfchat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (`"bad_request"`, `"internal"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<pdfchat_core::Error> for AppError {
    fn from(e: pdfchat_core::Error) -> Self {
        match e {
            pdfchat_core::Error::InvalidInput(msg) => bad_request(msg),
            other => internal(other.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ingest ============

async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    let mut uploads = Vec::new();
    let mut metadata = ExtraMetadata::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("upload_{}.pdf", uploads.len()));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                uploads.push(Upload::new(filename, bytes.to_vec()));
            }
            CONVERSATION_KEY | "user_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read field {}: {}", name, e)))?;
                if !value.trim().is_empty() {
                    metadata.insert(name, value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(bad_request("no files uploaded"));
    }

    let report = ingest_uploads(&state.services, uploads, &metadata)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(report))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    question: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let events = chat::ask(&state.services, &req.conversation_id, &req.question).await?;
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_ndjson())));
    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

// ============ GET /api/conversations/{id}/messages ============

#[derive(Serialize)]
struct MessagesResponse {
    conversation_id: String,
    messages: Vec<ConversationTurn>,
}

async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    let limit = state.services.config.retrieval.history_limit;
    let messages = state.services.messages.history(&id, limit).await?;
    Ok(Json(MessagesResponse {
        conversation_id: id,
        messages,
    }))
}
