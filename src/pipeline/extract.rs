//! Text extraction from uploaded documents.
//!
//! The pipeline only sees the [`TextExtractor`] trait: given the staged temp
//! file path and the raw bytes, return plain text. [`NativeExtractor`] is the
//! default hybrid implementation:
//!
//! | Extension | Strategy |
//! |-----------|----------|
//! | `pdf`  | `pdf-extract` on the bytes (panics from malformed fonts are caught) |
//! | `docx` | `docx-rs`: paragraphs, hyperlinks, table cells |
//! | `xlsx` | `calamine` on the temp path, one `=== Sheet ===` block per sheet |
//! | `csv`  | UTF-8 (lossy) read |
//! | `png`, `jpg`, `jpeg` | vision-model OCR via [`crate::pipeline::llm::ChatBackend`] |
//!
//! The parsers and the image decode ahead of OCR are synchronous and
//! CPU-bound, so they run inside `tokio::task::spawn_blocking`.

use crate::error::ExtractError;
use crate::pipeline::encode;
use crate::pipeline::llm::{ChatBackend, ChatRequest};
use crate::pipeline::postprocess::clean_text;
use crate::prompts::OCR_PROMPT;
use async_trait::async_trait;
use calamine::{open_workbook, Reader, Xlsx};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns an uploaded document into plain text.
///
/// Returning an empty string is allowed; the pipeline treats empty or
/// whitespace-only text as an extraction failure.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Pure-Rust extractor with vision-model OCR for image uploads.
#[derive(Clone, Default)]
pub struct NativeExtractor {
    ocr: Option<Arc<dyn ChatBackend>>,
}

impl NativeExtractor {
    /// Extractor without OCR; image uploads fail with [`ExtractError::Unsupported`].
    pub fn new() -> Self {
        Self { ocr: None }
    }

    /// Extractor that transcribes images with the given backend.
    pub fn with_ocr(backend: Arc<dyn ChatBackend>) -> Self {
        Self { ocr: Some(backend) }
    }

    async fn ocr_image(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let backend = self
            .ocr
            .as_ref()
            .ok_or_else(|| ExtractError::Unsupported("image (OCR disabled)".into()))?;
        let owned = bytes.to_vec();
        let image = run_blocking(move || {
            encode::encode_upload(&owned).map_err(|e| ExtractError::Ocr(e.to_string()))
        })
        .await?;

        let request = ChatRequest {
            system: OCR_PROMPT.to_string(),
            user: "Transcribe the text in this image.".to_string(),
            images: vec![image],
            temperature: 0.0,
            max_tokens: Some(4096),
            json_object: false,
        };
        let text = backend
            .complete(&request)
            .await
            .map_err(|e| ExtractError::Ocr(e.to_string()))?;
        info!("OCR produced {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for NativeExtractor {
    async fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        debug!("Extracting '.{}' upload ({} bytes)", ext, bytes.len());

        let raw = match ext.as_str() {
            "pdf" => {
                let owned = bytes.to_vec();
                run_blocking(move || extract_pdf(&owned)).await?
            }
            "docx" => {
                let owned = bytes.to_vec();
                run_blocking(move || extract_docx(&owned)).await?
            }
            "xlsx" => {
                let owned: PathBuf = path.to_path_buf();
                run_blocking(move || extract_xlsx(&owned)).await?
            }
            "csv" => String::from_utf8_lossy(bytes).into_owned(),
            "png" | "jpg" | "jpeg" => self.ocr_image(bytes).await?,
            other => return Err(ExtractError::Unsupported(other.to_string())),
        };

        let text = clean_text(&raw);
        debug!("Extracted {} chars ({} raw)", text.len(), raw.len());
        Ok(text)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::TaskFailed(e.to_string()))?
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract (and its font parsers) can panic on malformed glyph tables.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            warn!("PDF extraction failed: {}", e);
            Err(ExtractError::Pdf(e.to_string()))
        }
        Err(_) => {
            warn!("PDF extraction panicked, likely malformed fonts");
            Err(ExtractError::Pdf(
                "parser panicked, the PDF likely contains malformed fonts".into(),
            ))
        }
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut out = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                push_runs(&para.children, &mut out);
                out.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    let mut cells = Vec::with_capacity(tr.cells.len());
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        let mut text = String::new();
                        for content in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(para) = content {
                                push_runs(&para.children, &mut text);
                            }
                        }
                        cells.push(text);
                    }
                    out.push_str(&cells.join(" | "));
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn push_runs(children: &[docx_rs::ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    if let docx_rs::RunChild::Text(text) = run_child {
                        out.push_str(&text.text);
                    }
                }
            }
            docx_rs::ParagraphChild::Hyperlink(link) => push_runs(&link.children, out),
            _ => {}
        }
    }
}

fn extract_xlsx(path: &Path) -> Result<String, ExtractError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| ExtractError::Spreadsheet(format!("{e}")))?;

    let mut out = String::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };
        out.push_str(&format!("\n=== Sheet: {} ===\n", name));
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !cells.is_empty() {
                out.push_str(&cells.join(" | "));
                out.push('\n');
            }
        }
    }
    debug!("XLSX: {} sheets", sheet_names.len());
    Ok(out)
}
