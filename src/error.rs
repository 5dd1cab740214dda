//! Error types for the edgequake-docanalyze library.
//!
//! Three error types map onto three scopes of failure:
//!
//! * [`AnalysisError`]: **Request-level**: the request cannot be served at
//!   all (unsupported file type, empty or oversized batch, every file in a
//!   consolidated batch failed). Each variant carries an HTTP status via
//!   [`AnalysisError::status_code`].
//!
//! * [`ExtractError`]: **Per-file**: text extraction failed for one upload.
//!   Recorded in a [`crate::output::FileOutcome::Failed`] and never aborts a
//!   batch.
//!
//! * [`LlmCallError`]: **Per-attempt**: one LLM round-trip failed. The
//!   client wrapper retries and finally substitutes a fallback value, so
//!   this type never leaves [`crate::pipeline::llm`].

use std::path::PathBuf;
use thiserror::Error;

/// Request-level errors returned by the [`crate::Analyzer`] entry points.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Client input errors (4xx) ─────────────────────────────────────────
    /// The upload's extension is not in the allowed set.
    #[error("Unsupported file type: {extension}. Allowed types: {allowed}")]
    UnsupportedFileType { extension: String, allowed: String },

    /// The request contained no files.
    #[error("No files provided")]
    NoFiles,

    /// The request exceeded the per-request file cap.
    #[error("Maximum {max} files allowed per request")]
    TooManyFiles { max: usize, got: usize },

    /// The multipart body could not be read.
    #[error("Malformed upload: {0}")]
    Multipart(String),

    /// Consolidated mode: not a single file survived the per-file pipeline.
    #[error("No files could be processed successfully")]
    NoFilesProcessed { total: usize },

    // ── Local input errors (CLI) ──────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Server-side errors (5xx) ──────────────────────────────────────────
    /// The single-file pipeline produced a failed outcome.
    #[error("{error}")]
    FileFailed { filename: String, error: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// HTTP status code this error maps to on the service surface.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::UnsupportedFileType { .. }
            | AnalysisError::NoFiles
            | AnalysisError::TooManyFiles { .. }
            | AnalysisError::Multipart(_) => 400,
            AnalysisError::InputNotFound { .. } => 404,
            AnalysisError::NoFilesProcessed { .. } => 422,
            AnalysisError::DownloadFailed { .. } => 502,
            AnalysisError::FileFailed { .. }
            | AnalysisError::ProviderNotConfigured { .. }
            | AnalysisError::InvalidConfig(_)
            | AnalysisError::Internal(_) => 500,
        }
    }

    /// `true` for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// A non-fatal text extraction failure for a single upload.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Failed to parse DOCX: {0}")]
    Docx(String),

    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("No extractor available for '.{0}' files")]
    Unsupported(String),

    #[error("Extraction task failed: {0}")]
    TaskFailed(String),
}

/// One failed LLM round-trip. Retried by the client wrapper.
#[derive(Debug, Error)]
pub enum LlmCallError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty reply")]
    EmptyReply,

    #[error("LLM reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_lists_allowed() {
        let e = AnalysisError::UnsupportedFileType {
            extension: ".exe".into(),
            allowed: ".pdf, .docx".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".exe"), "got: {msg}");
        assert!(msg.contains(".pdf, .docx"), "got: {msg}");
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn batch_bounds_are_client_errors() {
        assert!(AnalysisError::NoFiles.is_client_error());
        let e = AnalysisError::TooManyFiles { max: 10, got: 11 };
        assert!(e.is_client_error());
        assert_eq!(e.to_string(), "Maximum 10 files allowed per request");
    }

    #[test]
    fn no_files_processed_is_unprocessable() {
        let e = AnalysisError::NoFilesProcessed { total: 3 };
        assert_eq!(e.status_code(), 422);
        assert_eq!(e.to_string(), "No files could be processed successfully");
    }

    #[test]
    fn file_failed_displays_bare_error() {
        let e = AnalysisError::FileFailed {
            filename: "a.pdf".into(),
            error: "Failed to extract text from document.".into(),
        };
        assert_eq!(e.to_string(), "Failed to extract text from document.");
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_client_error());
    }

    #[test]
    fn invalid_json_wraps_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let e = LlmCallError::from(err);
        assert!(e.to_string().starts_with("LLM reply is not valid JSON"));
    }
}
