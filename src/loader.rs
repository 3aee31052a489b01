//! Document loading with OCR fallback.
//!
//! For each uploaded file the loader:
//!
//! 1. Writes the bytes into a fresh temporary directory as
//!    `uploaded_file_{i}_{name}`.
//! 2. Extracts text natively, page by page.
//! 3. Asks [`OcrPolicy::needs_ocr`] whether that text is too sparse.
//! 4. If so, runs the OCR engine into `ocr_output_{name}` in the same
//!    directory and extracts the result.
//! 5. Lets [`OcrPolicy::select`] pick the content to keep, or skips the file.
//!
//! A failure on one file never affects the others. The temporary directory
//! is removed on every path when its guard drops.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;

use pdfchat_core::models::{total_chars, PageDocument};
use pdfchat_core::ocr::{OcrOutcome, OcrPolicy};

use crate::config::OcrConfig;
use crate::extract::{PageExtractor, PdfExtractor};
use crate::ocr::{NoOcr, OcrEngine, OcrMyPdf};

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name as uploaded; becomes the `source_id` of every page.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Which text ended up being used for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Native text was dense enough, or OCR did not improve on it.
    Native,
    /// OCR output replaced native text.
    Ocr,
    /// OCR was needed but failed; sparse native text was kept.
    NativeFallback,
}

/// Per-file result of a load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Loaded {
        filename: String,
        method: ExtractionMethod,
        pages: usize,
        chars: usize,
    },
    Skipped {
        filename: String,
        reason: String,
    },
}

/// Pages from every loadable file, in upload order, plus per-file outcomes.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<PageDocument>,
    pub files: Vec<FileOutcome>,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Skipped { .. }))
            .count()
    }
}

/// Loads uploads into pages, falling back to OCR for sparse files.
pub struct DocumentLoader {
    extractor: Arc<dyn PageExtractor>,
    ocr: Arc<dyn OcrEngine>,
    policy: OcrPolicy,
    language: String,
}

impl DocumentLoader {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        ocr: Arc<dyn OcrEngine>,
        policy: OcrPolicy,
        language: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            ocr,
            policy,
            language: language.into(),
        }
    }

    /// `pdf-extract` for native text and `ocrmypdf` (or nothing, when
    /// disabled) for OCR.
    pub fn from_config(config: &OcrConfig) -> Self {
        let ocr: Arc<dyn OcrEngine> = if config.enabled {
            Arc::new(OcrMyPdf::new(config.command.clone()))
        } else {
            Arc::new(NoOcr)
        };
        Self::new(
            Arc::new(PdfExtractor),
            ocr,
            config.policy(),
            config.language.clone(),
        )
    }

    /// Load every upload. Never fails as a whole; problem files are
    /// reported as [`FileOutcome::Skipped`].
    pub fn load(&self, uploads: &[Upload]) -> LoadReport {
        let mut report = LoadReport::default();
        for (index, upload) in uploads.iter().enumerate() {
            match self.load_one(index, upload) {
                Ok((pages, method)) => {
                    tracing::info!(
                        file = %upload.filename,
                        ?method,
                        pages = pages.len(),
                        "loaded file"
                    );
                    report.files.push(FileOutcome::Loaded {
                        filename: upload.filename.clone(),
                        method,
                        pages: pages.len(),
                        chars: total_chars(&pages),
                    });
                    report.documents.extend(pages);
                }
                Err(reason) => {
                    tracing::warn!(file = %upload.filename, %reason, "skipping file");
                    report.files.push(FileOutcome::Skipped {
                        filename: upload.filename.clone(),
                        reason,
                    });
                }
            }
        }
        report
    }

    fn load_one(
        &self,
        index: usize,
        upload: &Upload,
    ) -> Result<(Vec<PageDocument>, ExtractionMethod), String> {
        let dir = TempDir::new().map_err(|e| format!("could not create temp dir: {}", e))?;
        let safe_name = sanitize_filename(&upload.filename);
        let input = dir.path().join(format!("uploaded_file_{}_{}", index, safe_name));
        std::fs::write(&input, &upload.bytes)
            .map_err(|e| format!("could not save upload: {}", e))?;

        let native = match self.extractor.extract_pages(&input, &upload.filename) {
            Ok(pages) => Some(pages),
            Err(e) => {
                tracing::warn!(file = %upload.filename, error = %e, "native extraction failed");
                None
            }
        };

        if let Some(pages) = &native {
            if !self.policy.needs_ocr(Some(pages)) {
                return Ok((pages.clone(), ExtractionMethod::Native));
            }
        }

        let output = dir.path().join(format!("ocr_output_{}", safe_name));
        let (ocr_pages, ocr_failure) = self.run_ocr(&input, &output, &upload.filename);

        match self.policy.select(native.as_deref(), ocr_pages.as_deref()) {
            OcrOutcome::UseOcr => Ok((ocr_pages.unwrap_or_default(), ExtractionMethod::Ocr)),
            OcrOutcome::UseNative => Ok((native.unwrap_or_default(), ExtractionMethod::Native)),
            OcrOutcome::UseBestAvailable => Ok((
                native.unwrap_or_default(),
                ExtractionMethod::NativeFallback,
            )),
            OcrOutcome::Skip => Err(match ocr_failure {
                Some(why) => format!("no extractable text; {}", why),
                None => "no extractable text".to_string(),
            }),
        }
    }

    /// Run OCR and read its output. Returns the pages, or the reason there
    /// are none.
    fn run_ocr(
        &self,
        input: &Path,
        output: &Path,
        source_id: &str,
    ) -> (Option<Vec<PageDocument>>, Option<String>) {
        if let Err(e) = self.ocr.run(input, output, &self.language) {
            tracing::warn!(file = %source_id, error = %e, "OCR failed");
            return (None, Some(e.to_string()));
        }
        match self.extractor.extract_pages(output, source_id) {
            Ok(pages) => (Some(pages), None),
            Err(e) => {
                tracing::warn!(file = %source_id, error = %e, "could not read OCR output");
                (None, Some(format!("could not read OCR output: {}", e)))
            }
        }
    }
}

/// Keep only the final path component and replace anything that is not
/// safe in a file name.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}
