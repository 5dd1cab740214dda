//! # edgequake-docanalyze
//!
//! Classify and analyse business documents (invoices, balance sheets, P&L
//! statements, contracts, …) with a Large Language Model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (pdf, docx, xlsx, csv, png, jpg)
//!  │
//!  ├─ 1. Validate  extension allow-list
//!  ├─ 2. Stage     scoped temp file, removed on drop
//!  ├─ 3. Extract   pdf-extract / docx-rs / calamine / vision OCR (spawn_blocking)
//!  ├─ 4. Classify  first 4000 chars → {"document_type": ...}
//!  ├─ 5. Analyse   full text + type → free-form JSON object
//!  └─ 6. Output    FileOutcome with a 1000-char excerpt
//! ```
//!
//! Every LLM call is a JSON-object request retried up to three times, with
//! a fixed fallback value when all attempts fail. Batches run either
//! independently (concurrent, per-file results in upload order) or
//! consolidated (one cross-document analysis over the joined excerpts).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docanalyze::{AnalysisConfig, Analyzer, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY / OPENAI_MODEL
//!     let analyzer = Analyzer::new(AnalysisConfig::from_env())?;
//!     let file = UploadedFile::new("invoice.pdf", std::fs::read("invoice.pdf")?);
//!     let result = analyzer.analyze_file(file).await?;
//!     println!("{}: {}", result.filename, result.document_type);
//!     println!("{}", serde_json::to_string_pretty(&result.analysis)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP service ([`server`]) |
//! | `cli`    | on      | The `docanalyze` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-docanalyze = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{Analyzer, EMPTY_TEXT_ERROR};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, RetryPolicy};
pub use error::{AnalysisError, ExtractError, LlmCallError};
pub use output::{
    AnalyzedFile, BatchOutcome, BatchStatus, Classification, ConsolidatedOutcome, DocumentType,
    FileInfo, FileOutcome, JsonObject, UploadedFile,
};
pub use pipeline::extract::{NativeExtractor, TextExtractor};
pub use pipeline::input::load_input;
pub use pipeline::llm::{ChatBackend, ChatRequest, JsonLlmClient, JsonReply, ProviderBackend};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
