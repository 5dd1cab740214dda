//! Pipeline stages for document analysis.
//!
//! Each submodule implements one step of the per-file pipeline, so every
//! step can be tested on its own and swapped (e.g. a different extractor)
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ postprocess ──▶ llm (classify) ──▶ llm (analyze)
//! (validate, stage)  (pdf/docx/xlsx/ocr)  (cleanup)   (JSON + retries)
//! ```
//!
//! 1. [`input`]: extension check, scoped temp file, path/URL loading
//! 2. [`extract`]: text extraction; image uploads go through [`encode`]
//!    and a vision call
//! 3. [`postprocess`]: deterministic text cleanup and reply unwrapping
//! 4. [`llm`]: the JSON-contracted LLM client with fixed retries

pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
