//! OCR decision policy.
//!
//! Two pure decisions drive the OCR fallback in the document loader:
//!
//! - [`OcrPolicy::needs_ocr`]: is native extraction too sparse to trust?
//! - [`OcrPolicy::select`]: given native pages and the result of an OCR
//!   pass, which content should be indexed?
//!
//! Both thresholds are tunable through [`OcrPolicy`]; the defaults are
//! 500 characters per page and a 10% improvement margin.

use crate::models::{total_chars, PageDocument};

/// Average characters per page below which a document is treated as
/// scanned or image-based.
pub const DEFAULT_MIN_CHARS_PER_PAGE: f64 = 500.0;

/// OCR output must exceed native output by this factor to replace it.
pub const DEFAULT_IMPROVEMENT_RATIO: f64 = 1.1;

/// Which extraction result to keep for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrOutcome {
    /// Native text is adequate; OCR output (if any) did not improve on it.
    UseNative,
    /// OCR output is used in place of native text.
    UseOcr,
    /// OCR failed or produced nothing usable; keep whatever native text exists.
    UseBestAvailable,
    /// Neither pass produced content; the file contributes nothing.
    Skip,
}

/// Thresholds for the OCR fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrPolicy {
    pub min_chars_per_page: f64,
    pub improvement_ratio: f64,
}

impl Default for OcrPolicy {
    fn default() -> Self {
        Self {
            min_chars_per_page: DEFAULT_MIN_CHARS_PER_PAGE,
            improvement_ratio: DEFAULT_IMPROVEMENT_RATIO,
        }
    }
}

impl OcrPolicy {
    /// Decide whether OCR should be attempted.
    ///
    /// True when extraction failed, produced zero pages, or produced
    /// strictly fewer than `min_chars_per_page` characters per page on
    /// average.
    pub fn needs_ocr(&self, native: Option<&[PageDocument]>) -> bool {
        let pages = match native {
            Some(p) if !p.is_empty() => p,
            _ => return true,
        };
        let avg = total_chars(pages) as f64 / pages.len() as f64;
        avg < self.min_chars_per_page
    }

    /// Choose between native and OCR content.
    ///
    /// `native` is `None` when native extraction failed; `ocr` is `None`
    /// when the OCR pass failed or could not be loaded. Rules, in order:
    ///
    /// 1. OCR characters exceed native characters by more than the
    ///    improvement ratio: use OCR.
    /// 2. Native produced no pages but OCR did: use OCR.
    /// 3. Both produced pages and OCR is not a clear improvement: use native.
    /// 4. Otherwise use native if it produced pages, else skip.
    pub fn select(
        &self,
        native: Option<&[PageDocument]>,
        ocr: Option<&[PageDocument]>,
    ) -> OcrOutcome {
        let native = native.unwrap_or(&[]);
        let native_chars = total_chars(native) as f64;

        if let Some(ocr) = ocr {
            let ocr_chars = total_chars(ocr) as f64;
            if ocr_chars > native_chars * self.improvement_ratio {
                return OcrOutcome::UseOcr;
            }
            if native.is_empty() && !ocr.is_empty() {
                return OcrOutcome::UseOcr;
            }
            if !native.is_empty() && !ocr.is_empty() {
                return OcrOutcome::UseNative;
            }
        }

        if native.is_empty() {
            OcrOutcome::Skip
        } else {
            OcrOutcome::UseBestAvailable
        }
    }
}
