//! Error types for the fiyatex library.
//!
//! Two distinct failure tiers reflect two distinct failure modes:
//!
//! * [`ExtractError`], **fatal**: the document cannot be processed at all
//!   (missing file, corrupt PDF, unreadable workbook, provider not
//!   configured, master dataset I/O). Returned as `Err(ExtractError)` from
//!   the top-level entry points.
//!
//! * **Demoted failures**: a price string that fails to parse drops its row;
//!   a sheet or table with no usable columns is skipped; a transient service
//!   error is retried and ultimately recorded as a `gave-up`/`error`
//!   [`crate::record::PageOutcome`]. None of these ever propagate out of the
//!   per-sheet / per-page loops.
//!
//! The separation lets callers decide their own tolerance: a document that
//! yields nothing is "no data extracted", not a crash.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fiyatex library.
///
/// Page- and row-level failures are demoted to statuses in the page ledger
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document cannot be opened or parsed at all.
    #[error("document '{path}' cannot be opened: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// The spreadsheet could not be opened at all (sheet-level misses are
    /// skipped silently; this is workbook-level).
    #[error("workbook error for '{source_file}': {detail}")]
    WorkbookError { source_file: String, detail: String },

    /// pdfium returned an error rasterising a specific page.
    #[error("rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    /// The extraction guide file could not be read or parsed.
    #[error("extraction guide '{path}': {detail}")]
    GuideError { path: PathBuf, detail: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key
    /// etc.). Only surfaced when the cascade actually needs the fallback.
    #[error("vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Master dataset errors ─────────────────────────────────────────────
    /// Reading or writing the master snapshot failed.
    #[error("master dataset I/O failed at '{path}': {detail}")]
    MasterIo { path: PathBuf, detail: String },

    /// The relational mirror could not be rebuilt.
    #[error("master database error: {0}")]
    MasterDb(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure reported by a black-box OCR engine.
///
/// The engine itself is out of scope; implementations of
/// [`crate::pipeline::ocr::OcrEngine`] wrap whatever backend they use and
/// report failures through this type. A recognition failure on one page only
/// skips that page's text.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine rejected the image (format, size).
    #[error("OCR rejected image: {0}")]
    BadImage(String),

    /// The engine itself failed.
    #[error("OCR engine failed: {0}")]
    Engine(String),
}

/// Error returned by a vision/OCR language-model backend.
///
/// The variants mirror the retry policy of the fallback stage: `Timeout` and
/// `Connection` are transient and drive the retry/split ladder; `Api` is
/// terminal for the attempt.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The request exceeded its deadline.
    #[error("model request timed out")]
    Timeout,

    /// The request never reached the backend (DNS, TCP reset, TLS).
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend answered with an error (auth, quota, malformed request).
    #[error("API error: {0}")]
    Api(String),
}

impl ModelError {
    /// Timeouts and connection drops are worth retrying; API errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Timeout | ModelError::Connection(_))
    }

    /// Classify a provider error from its rendered message.
    ///
    /// The provider crate boxes backend-specific error types; the rendered
    /// text is the one stable surface across providers.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ModelError::Timeout
        } else if lower.contains("connection") || lower.contains("connect") {
            ModelError::Connection(message.to_string())
        } else {
            ModelError::Api(message.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_timeout_message() {
        assert!(matches!(
            ModelError::classify("request timed out after 60s"),
            ModelError::Timeout
        ));
    }

    #[test]
    fn classify_connection_message() {
        assert!(matches!(
            ModelError::classify("Connection reset by peer"),
            ModelError::Connection(_)
        ));
    }

    #[test]
    fn classify_api_message() {
        let e = ModelError::classify("invalid api key");
        assert!(matches!(e, ModelError::Api(_)));
        assert!(!e.is_transient());
    }

    #[test]
    fn workbook_error_display() {
        let e = ExtractError::WorkbookError {
            source_file: "list.xlsx".into(),
            detail: "bad zip".into(),
        };
        assert!(e.to_string().contains("list.xlsx"));
    }
}
