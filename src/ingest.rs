//! Ingestion pipeline: uploads → pages → chunks → vector store.
//!
//! ```text
//! Upload ──► DocumentLoader ──► Splitter + ids ──► Indexer ──► VectorStore
//!           (native / OCR)      (800 / 80 chars)    (batches of 5, retry)
//! ```
//!
//! Loading is blocking work (PDF parsing, the OCR subprocess) and runs on
//! tokio's blocking pool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;

use pdfchat_core::chunk::Splitter;
use pdfchat_core::models::{ExtraMetadata, PageDocument};

use crate::chat::CONVERSATION_KEY;
use crate::config::Config;
use crate::index::{IndexReport, Indexer};
use crate::loader::{FileOutcome, Upload};
use crate::services::Services;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
    pub pages: usize,
    pub chunks: usize,
    #[serde(flatten)]
    pub index: IndexReport,
}

/// Load, chunk, and index `uploads`, attaching `metadata` to every chunk.
///
/// When `metadata` names a conversation, source ids become
/// `{conversation_id}/{filename}` so the same file uploaded to two
/// conversations is indexed once per conversation.
///
/// Problem files and failed batches are reported, not raised. Errors are
/// returned only when nothing can proceed (e.g. the store is unreachable).
pub async fn ingest_uploads(
    services: &Services,
    uploads: Vec<Upload>,
    metadata: &ExtraMetadata,
) -> Result<IngestReport> {
    let loader = services.loader.clone();
    let mut loaded = tokio::task::spawn_blocking(move || loader.load(&uploads))
        .await
        .context("document loader task failed")?;
    scope_sources(&mut loaded.documents, metadata);

    let chunking = &services.config.chunking;
    let splitter = Splitter::new(chunking.chunk_size, chunking.chunk_overlap)?;
    let chunks = splitter.split_pages(&loaded.documents, metadata);

    let indexer = Indexer::from_config(services.store.clone(), &services.config.indexing);
    let index = indexer.index(&chunks).await?;

    Ok(IngestReport {
        files: loaded.files,
        pages: loaded.documents.len(),
        chunks: chunks.len(),
        index,
    })
}

fn scope_sources(documents: &mut [PageDocument], metadata: &ExtraMetadata) {
    let Some(conversation) = metadata.get(CONVERSATION_KEY) else {
        return;
    };
    for doc in documents {
        doc.source_id = format!("{}/{}", conversation, doc.source_id);
    }
}

/// Read CLI path arguments into uploads.
///
/// Files are taken as given. Directories are walked recursively for
/// `*.pdf` (any case). Results are sorted by path so runs are repeatable.
pub fn collect_uploads(paths: &[PathBuf]) -> Result<Vec<Upload>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false) {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() && is_pdf(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }
    files.sort();
    files.dedup();

    files
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Upload::new(name, bytes))
        })
        .collect()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// `pdfchat ingest`: ingest files from disk and print a summary.
pub async fn run_ingest(config: &Config, paths: &[PathBuf], metadata: ExtraMetadata) -> Result<()> {
    let uploads = collect_uploads(paths)?;
    let services = Services::from_config(config.clone()).await?;
    let report = ingest_uploads(&services, uploads, &metadata).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("ingest");
    for file in &report.files {
        match file {
            FileOutcome::Loaded {
                filename,
                method,
                pages,
                chars,
            } => println!(
                "  {}: {:?}, {} pages, {} chars",
                filename, method, pages, chars
            ),
            FileOutcome::Skipped { filename, reason } => {
                println!("  {}: skipped ({})", filename, reason)
            }
        }
    }
    println!("  pages: {}", report.pages);
    println!("  chunks: {}", report.chunks);
    println!("  already indexed: {}", report.index.already_indexed);
    println!("  inserted: {}", report.index.inserted);
    println!("  failed: {}", report.index.failed_chunks());
    println!("ok");
}

/// `pdfchat reset`: delete every indexed chunk. Conversations are kept.
pub async fn run_reset(config: &Config) -> Result<()> {
    let services = Services::from_config(config.clone()).await?;
    let before = services.store.count().await?;
    services.store.reset().await?;
    println!("reset");
    println!("  removed: {}", before);
    println!("ok");
    Ok(())
}
