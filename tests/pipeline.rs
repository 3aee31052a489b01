//! End-to-end tests: real PDF bytes through extraction, chunking,
//! indexing, retrieval, and the streamed answer, with fake model
//! providers and an in-memory vector store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

use pdfchat::chat::{ask, CONVERSATION_KEY};
use pdfchat::config::load_config;
use pdfchat::extract::PdfExtractor;
use pdfchat::ingest::ingest_uploads;
use pdfchat::loader::{DocumentLoader, FileOutcome, Upload};
use pdfchat::ocr::{OcrEngine, OcrError};
use pdfchat::services::Services;
use pdfchat::{db, migrate, server};
use pdfchat_core::completion::{CompletionProvider, CompletionRequest, CompletionStream};
use pdfchat_core::embedding::EmbeddingProvider;
use pdfchat_core::models::{ExtraMetadata, SenderType, StreamEvent};
use pdfchat_core::prompt::FALLBACK_PREFIX;
use pdfchat_core::store::memory::InMemoryStore;

// ============ Fixtures ============

/// Build a PDF with one line of Helvetica text per page.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for text in pages {
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn geography_pdf() -> Vec<u8> {
    build_pdf(&[
        "Paris is the capital of France.",
        "Berlin is the capital of Germany.",
    ])
}

/// OCR engine that is never installed; sparse pages keep their native text.
struct MissingOcr;

impl OcrEngine for MissingOcr {
    fn run(&self, _input: &Path, _output: &Path, _language: &str) -> Result<(), OcrError> {
        Err(OcrError::NotFound("ocrmypdf".into()))
    }
}

/// Letter-frequency vectors: deterministic and good enough to rank.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> pdfchat_core::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().bytes() {
                    if c.is_ascii_lowercase() {
                        v[(c - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Answers from context when it mentions Paris, otherwise says it can't.
/// Without context (the fallback prompt) it answers about Mars.
struct ScriptedModel;

#[async_trait]
impl CompletionProvider for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream_generate(
        &self,
        request: &CompletionRequest,
    ) -> pdfchat_core::Result<CompletionStream> {
        let prompt = &request.prompt;
        let fragments: Vec<&str> = if !prompt.contains("Context from documents:") {
            vec!["Mars averages ", "about -60 C."]
        } else if prompt.contains("Paris is the capital") && prompt.contains("capital of France?") {
            vec!["The capital of France ", "is Paris."]
        } else {
            vec!["Answer is not available ", "in the context"]
        };
        let items: Vec<pdfchat_core::Result<String>> =
            fragments.into_iter().map(|f| Ok(f.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct Harness {
    _tmp: TempDir,
    services: Arc<Services>,
    store: Arc<InMemoryStore>,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let config_path = write_config(&root);
    let config = load_config(&config_path).unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let store = Arc::new(InMemoryStore::new(Arc::new(LetterEmbedder)));
    let loader = Arc::new(DocumentLoader::new(
        Arc::new(PdfExtractor),
        Arc::new(MissingOcr),
        config.ocr.policy(),
        "eng",
    ));
    let services = Services::from_parts(config, pool, store.clone(), Arc::new(ScriptedModel), loader);

    Harness {
        _tmp: tmp,
        services: Arc::new(services),
        store,
    }
}

fn write_config(root: &Path) -> PathBuf {
    let content = format!(
        r#"[db]
path = "{}/data/pdfchat.sqlite"

[indexing]
base_delay_ms = 0
max_delay_ms = 0
batch_pause_ms = 0
"#,
        root.display()
    );
    let path = root.join("pdfchat.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn conversation(id: &str) -> ExtraMetadata {
    let mut metadata = ExtraMetadata::new();
    metadata.insert(CONVERSATION_KEY.to_string(), id.to_string());
    metadata
}

async fn ingest_geography(h: &Harness, conversation_id: &str) -> pdfchat::ingest::IngestReport {
    ingest_uploads(
        &h.services,
        vec![Upload::new("geo.pdf", geography_pdf())],
        &conversation(conversation_id),
    )
    .await
    .unwrap()
}

async fn collect(h: &Harness, conversation_id: &str, question: &str) -> Vec<StreamEvent> {
    ask(&h.services, conversation_id, question)
        .await
        .unwrap()
        .collect()
        .await
}

// ============ Ingestion ============

#[tokio::test]
async fn test_ingest_real_pdf() {
    let h = harness().await;
    let report = ingest_geography(&h, "c1").await;

    assert_eq!(report.pages, 2);
    assert_eq!(report.chunks, 2);
    assert_eq!(report.index.inserted, 2);
    assert!(report.index.failed_batches.is_empty());
    match &report.files[0] {
        FileOutcome::Loaded {
            filename, pages, ..
        } => {
            assert_eq!(filename, "geo.pdf");
            assert_eq!(*pages, 2);
        }
        other => panic!("expected loaded file, got {:?}", other),
    }

    let ids = {
        use pdfchat_core::store::VectorStore;
        h.store.existing_ids().await.unwrap()
    };
    assert!(ids.contains("c1/geo.pdf:1:0"));
    assert!(ids.contains("c1/geo.pdf:2:0"));
}

#[tokio::test]
async fn test_reingest_writes_nothing() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;
    let writes = h.store.write_count();

    let second = ingest_geography(&h, "c1").await;
    assert_eq!(second.index.inserted, 0);
    assert_eq!(second.index.already_indexed, 2);
    assert_eq!(h.store.write_count(), writes);
}

#[tokio::test]
async fn test_same_file_in_second_conversation_is_indexed_and_answerable() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;

    let second = ingest_geography(&h, "c2").await;
    assert_eq!(second.index.inserted, 2);
    assert_eq!(second.index.already_indexed, 0);

    let events = collect(&h, "c2", "What is the capital of France?").await;
    match &events[0] {
        StreamEvent::Metadata { sources, .. } => {
            assert!(sources.contains(&"c2/geo.pdf:1:0".to_string()));
            assert!(sources.iter().all(|id| id.starts_with("c2/")));
        }
        other => panic!("expected metadata first, got {:?}", other),
    }
    let answer: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::RagChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answer, "The capital of France is Paris.");
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::FallbackStart { .. })));
}

#[tokio::test]
async fn test_unreadable_upload_is_skipped() {
    let h = harness().await;
    let report = ingest_uploads(
        &h.services,
        vec![
            Upload::new("broken.pdf", b"not a pdf at all".to_vec()),
            Upload::new("geo.pdf", geography_pdf()),
        ],
        &conversation("c1"),
    )
    .await
    .unwrap();

    assert!(matches!(
        &report.files[0],
        FileOutcome::Skipped { filename, .. } if filename == "broken.pdf"
    ));
    assert_eq!(report.index.inserted, 2);
}

// ============ Answering ============

#[tokio::test]
async fn test_grounded_answer_streams_and_persists_once() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;

    let events = collect(&h, "c1", "What is the capital of France?").await;

    match &events[0] {
        StreamEvent::Metadata {
            conversation_id,
            sources,
        } => {
            assert_eq!(conversation_id, "c1");
            assert!(sources.contains(&"c1/geo.pdf:1:0".to_string()));
        }
        other => panic!("expected metadata first, got {:?}", other),
    }
    let answer: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::RagChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answer, "The capital of France is Paris.");
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::FallbackStart { .. } | StreamEvent::Error { .. })));

    let turns = h.services.messages.history("c1", 50).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].sender_type, SenderType::User);
    assert_eq!(turns[0].content, "What is the capital of France?");
    assert_eq!(turns[1].sender_type, SenderType::Bot);
    assert_eq!(turns[1].content, "The capital of France is Paris.");
}

#[tokio::test]
async fn test_unanswerable_question_falls_back() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;

    let events = collect(&h, "c1", "How cold is Mars?").await;

    let start = events
        .iter()
        .position(|e| matches!(e, StreamEvent::FallbackStart { .. }))
        .expect("fallback_start emitted");
    assert_eq!(
        events[start],
        StreamEvent::FallbackStart {
            content: FALLBACK_PREFIX.to_string()
        }
    );
    let general: String = events[start + 1..]
        .iter()
        .filter_map(|e| match e {
            StreamEvent::FallbackChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(general, "Mars averages about -60 C.");

    let turns = h.services.messages.history("c1", 50).await.unwrap();
    let bots: Vec<_> = turns
        .iter()
        .filter(|t| t.sender_type == SenderType::Bot)
        .collect();
    assert_eq!(bots.len(), 1);
    assert!(bots[0].content.starts_with(FALLBACK_PREFIX));
    assert!(bots[0].content.ends_with("Mars averages about -60 C."));
}

#[tokio::test]
async fn test_no_documents_falls_back_with_prefix() {
    let h = harness().await;

    let events = collect(&h, "c1", "What is the capital of Mars?").await;

    assert_eq!(
        events[0],
        StreamEvent::Metadata {
            conversation_id: "c1".into(),
            sources: vec![],
        }
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::RagChunk { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::FallbackStart { .. })));

    let turns = h.services.messages.history("c1", 50).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[1].content.starts_with(FALLBACK_PREFIX));
}

#[tokio::test]
async fn test_other_conversation_cannot_see_documents() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;

    let events = collect(&h, "c2", "What is the capital of France?").await;

    assert_eq!(
        events[0],
        StreamEvent::Metadata {
            conversation_id: "c2".into(),
            sources: vec![],
        }
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::FallbackStart { .. })));
}

#[tokio::test]
async fn test_history_is_carried_into_later_turns() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;

    collect(&h, "c1", "What is the capital of France?").await;
    collect(&h, "c1", "How cold is Mars?").await;

    let turns = h.services.messages.history("c1", 50).await.unwrap();
    assert_eq!(turns.len(), 4);
    let latest = h.services.messages.history("c1", 1).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].sender_type, SenderType::Bot);
}

#[tokio::test]
async fn test_empty_question_rejected_before_streaming() {
    let h = harness().await;
    let result = ask(&h.services, "c1", "   ").await;
    assert!(matches!(result, Err(pdfchat_core::Error::InvalidInput(_))));
    assert!(h.services.messages.history("c1", 50).await.unwrap().is_empty());
}

// ============ HTTP ============

async fn spawn_server(h: &Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(h.services.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_health() {
    let h = harness().await;
    let base = spawn_server(&h).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_http_chat_streams_ndjson() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;
    let base = spawn_server(&h).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&serde_json::json!({
            "conversation_id": "c1",
            "question": "What is the capital of France?",
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );

    let text = response.text().await.unwrap();
    let events: Vec<StreamEvent> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(matches!(events[0], StreamEvent::Metadata { .. }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::RagChunk {
            content: "is Paris.".into()
        })
    );
}

#[tokio::test]
async fn test_http_chat_rejects_empty_question() {
    let h = harness().await;
    let base = spawn_server(&h).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&serde_json::json!({ "conversation_id": "c1", "question": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_http_conversation_messages() {
    let h = harness().await;
    ingest_geography(&h, "c1").await;
    collect(&h, "c1", "What is the capital of France?").await;
    let base = spawn_server(&h).await;

    let body: serde_json::Value = reqwest::get(format!("{}/api/conversations/c1/messages", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["conversation_id"], "c1");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][1]["sender_type"], "bot");
}
