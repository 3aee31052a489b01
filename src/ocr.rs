//! OCR engine invocation.
//!
//! OCR runs as an external process that reads a PDF and writes a new PDF
//! with a recognized text layer. The default engine is `ocrmypdf`:
//!
//! ```text
//! ocrmypdf -l <language> --output-type pdf --force-ocr <input> <output>
//! ```
//!
//! The engine's output is then read with the same native extractor as any
//! other PDF.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Why an OCR run produced no usable output.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine executable could not be found.
    #[error("OCR engine '{0}' not found; install it or set ocr.command")]
    NotFound(String),
    /// The engine ran and exited unsuccessfully.
    #[error("OCR engine exited with {code:?}: {stderr}")]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// OCR is switched off in configuration.
    #[error("OCR is disabled")]
    Disabled,
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts an image-based PDF into a text-bearing PDF.
pub trait OcrEngine: Send + Sync {
    /// Run OCR on `input`, writing the result to `output`.
    fn run(&self, input: &Path, output: &Path, language: &str) -> Result<(), OcrError>;
}

/// [`OcrEngine`] that shells out to `ocrmypdf` (or a compatible command).
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    command: String,
}

impl OcrMyPdf {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new("ocrmypdf")
    }
}

impl OcrEngine for OcrMyPdf {
    fn run(&self, input: &Path, output: &Path, language: &str) -> Result<(), OcrError> {
        tracing::info!(input = %input.display(), language, "running OCR");
        let result = Command::new(&self.command)
            .arg("-l")
            .arg(language)
            .arg("--output-type")
            .arg("pdf")
            .arg("--force-ocr")
            .arg(input)
            .arg(output)
            .output();

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OcrError::NotFound(self.command.clone()))
            }
            Err(e) => return Err(OcrError::Io(e)),
        };

        if !out.status.success() {
            return Err(OcrError::Failed {
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(OcrError::Failed {
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: "engine reported success but wrote no output".to_string(),
            });
        }
        Ok(())
    }
}

/// Stand-in engine used when `ocr.enabled = false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcr;

impl OcrEngine for NoOcr {
    fn run(&self, _input: &Path, _output: &Path, _language: &str) -> Result<(), OcrError> {
        Err(OcrError::Disabled)
    }
}
