//! Error types for the kosha-digitizer library.
//!
//! Three error types, one per failure scope:
//!
//! * [`KoshaError`] — **Fatal**: the stage cannot proceed at all (missing
//!   source file, bad page range, Tesseract language data not installed,
//!   correction service not configured). Returned as `Err(KoshaError)` from
//!   the top-level `extract_*`, `segment_*` and `correct_*` functions.
//!
//! * [`CorrectionError`] — the outcome of one request to a
//!   [`crate::pipeline::llm::Corrector`]. Classified so the retry loop knows
//!   which failures are worth another attempt.
//!
//! * [`RecordError`] — **Non-fatal**: a single record could not be corrected
//!   after all retries. Stored in [`crate::output::RecordOutcome`]; the record
//!   itself is kept unchanged with `corrected: false`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the kosha-digitizer library.
#[derive(Debug, Error)]
pub enum KoshaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The requested page range is malformed (start < 1 or start > end).
    #[error("Invalid page range {start}-{end}: pages are 1-indexed and start must be <= end")]
    InvalidPageRange { start: usize, end: usize },

    /// A requested page number exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The record file could not be parsed.
    #[error("Record file '{path}' is not a valid sloka mapping: {detail}")]
    InvalidRecordFile { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Copying pages into the new document or saving it failed.
    #[error("Failed to assemble extracted PDF '{path}': {detail}")]
    PdfWriteFailed { path: PathBuf, detail: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The tesseract binary could not be executed.
    #[error(
        "OCR engine '{command}' is not available: {detail}\n\
Install Tesseract (e.g. `apt install tesseract-ocr` or `brew install tesseract`)\n\
or point --tesseract at the binary."
    )]
    OcrEngineUnavailable { command: String, detail: String },

    /// Tesseract runs but the trained data for the language is missing.
    #[error(
        "Tesseract language data '{language}' is not installed.\n\
Installed languages: {installed}\n\
Install it (e.g. `apt install tesseract-ocr-{language}`) or copy {language}.traineddata into TESSDATA_PREFIX."
    )]
    LanguageDataMissing { language: String, installed: String },

    /// Tesseract failed on a page.
    #[error("OCR failed on page {page}: {detail}")]
    OcrFailed { page: usize, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The correction backend is not initialised (missing key, project, token).
    #[error("Correction service '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The correction service rejected our credentials mid-batch.
    #[error(
        "Authentication error from '{provider}': {detail}\n\
Check your credentials and that the model is enabled for your project."
    )]
    AuthError { provider: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single correction request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrectionError {
    /// 401/403: credentials rejected or model access disabled. Not retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// 404: the model id does not exist for this backend/region. Not retried.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// 429: the service asked us to slow down.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Any other API or transport failure.
    #[error("{0}")]
    Api(String),
}

impl CorrectionError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CorrectionError::RateLimited { .. } | CorrectionError::Timeout { .. } | CorrectionError::Api(_)
        )
    }

    /// Classify an HTTP status + body into an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", truncate(body, 300));
        match status {
            401 | 403 => CorrectionError::Auth(detail),
            404 => CorrectionError::ModelNotFound(detail),
            429 => CorrectionError::RateLimited {
                retry_after_secs: None,
            },
            _ => CorrectionError::Api(detail),
        }
    }

    /// Classify an opaque provider error message.
    ///
    /// `edgequake-llm` surfaces errors as strings, so we look for the same
    /// markers a human would: status codes and "permission"/"not found".
    pub fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("permission")
            || lower.contains("invalid api key")
            || lower.contains("authentication")
        {
            CorrectionError::Auth(msg.to_string())
        } else if lower.contains("404") || lower.contains("not found") {
            CorrectionError::ModelNotFound(msg.to_string())
        } else if lower.contains("429") || lower.contains("rate limit") {
            CorrectionError::RateLimited {
                retry_after_secs: None,
            }
        } else if lower.contains("timed out") || lower.contains("timeout") {
            CorrectionError::Timeout { secs: 0 }
        } else {
            CorrectionError::Api(msg.to_string())
        }
    }
}

/// A non-fatal error for a single record.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The correction call failed after retries.
    #[error("Record {index}: correction failed after {retries} retries: {detail}")]
    CorrectionFailed {
        index: usize,
        retries: u32,
        detail: String,
    },

    /// The record was corrected, but both its corrected and original keys were
    /// already present in the output collection.
    #[error("Record {index}: duplicate of an existing entry, merged")]
    Merged { index: usize },
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_display() {
        let e = KoshaError::InvalidPageRange { start: 20, end: 10 };
        let msg = e.to_string();
        assert!(msg.contains("20-10"), "got: {msg}");
    }

    #[test]
    fn language_missing_names_language() {
        let e = KoshaError::LanguageDataMissing {
            language: "san".into(),
            installed: "eng, osd".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'san'"));
        assert!(msg.contains("tesseract-ocr-san"));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            CorrectionError::from_status(401, "bad key"),
            CorrectionError::Auth(_)
        ));
        assert!(matches!(
            CorrectionError::from_status(403, "denied"),
            CorrectionError::Auth(_)
        ));
        assert!(matches!(
            CorrectionError::from_status(404, ""),
            CorrectionError::ModelNotFound(_)
        ));
        assert!(matches!(
            CorrectionError::from_status(429, ""),
            CorrectionError::RateLimited { .. }
        ));
        assert!(matches!(
            CorrectionError::from_status(503, "overloaded"),
            CorrectionError::Api(_)
        ));
    }

    #[test]
    fn retryability() {
        assert!(!CorrectionError::Auth("x".into()).is_retryable());
        assert!(!CorrectionError::ModelNotFound("x".into()).is_retryable());
        assert!(CorrectionError::Timeout { secs: 60 }.is_retryable());
        assert!(CorrectionError::RateLimited {
            retry_after_secs: Some(2)
        }
        .is_retryable());
        assert!(CorrectionError::Api("503".into()).is_retryable());
    }

    #[test]
    fn message_classification() {
        assert!(matches!(
            CorrectionError::from_message("Permission denied on resource"),
            CorrectionError::Auth(_)
        ));
        assert!(matches!(
            CorrectionError::from_message("model xyz not found"),
            CorrectionError::ModelNotFound(_)
        ));
        assert!(matches!(
            CorrectionError::from_message("connection reset"),
            CorrectionError::Api(_)
        ));
    }

    #[test]
    fn rate_limit_display_with_retry() {
        let e = CorrectionError::RateLimited {
            retry_after_secs: Some(60),
        };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let e = CorrectionError::from_status(500, &body);
        assert!(e.to_string().chars().count() < 400);
    }
}
