//! Result types returned by the analysis pipeline.
//!
//! Every type here is request-scoped: created while a request is served and
//! dropped once the response has been serialised. The JSON shapes match what
//! the HTTP surface returns, so the same structs back the CLI `--json`
//! output and the service responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// A JSON object as returned by the LLM. Never schema-checked.
pub type JsonObject = Map<String, Value>;

/// One uploaded document: filename plus raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    /// Lower-cased extension without the leading dot (`"pdf"`); empty when
    /// the filename has none.
    pub extension: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        Self {
            filename,
            extension,
            content: content.into(),
        }
    }

    /// Extension with its leading dot, as used for temp-file suffixes and
    /// error messages. Empty when the file has no extension.
    pub fn dotted_extension(&self) -> String {
        if self.extension.is_empty() {
            String::new()
        } else {
            format!(".{}", self.extension)
        }
    }
}

/// Document categories the classifier is asked to choose from.
///
/// Anything else the model answers is kept verbatim in [`DocumentType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentType {
    Invoice,
    BalanceSheet,
    ProfitAndLossStatement,
    Contract,
    GeneralDocument,
    Other(String),
}

impl DocumentType {
    pub fn as_str(&self) -> &str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::BalanceSheet => "BalanceSheet",
            DocumentType::ProfitAndLossStatement => "ProfitAndLossStatement",
            DocumentType::Contract => "Contract",
            DocumentType::GeneralDocument => "GeneralDocument",
            DocumentType::Other(s) => s,
        }
    }
}

impl From<String> for DocumentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Invoice" => DocumentType::Invoice,
            "BalanceSheet" => DocumentType::BalanceSheet,
            "ProfitAndLossStatement" => DocumentType::ProfitAndLossStatement,
            "Contract" => DocumentType::Contract,
            "GeneralDocument" => DocumentType::GeneralDocument,
            _ => DocumentType::Other(s),
        }
    }
}

impl From<&str> for DocumentType {
    fn from(s: &str) -> Self {
        DocumentType::from(s.to_string())
    }
}

impl From<DocumentType> for String {
    fn from(t: DocumentType) -> Self {
        match t {
            DocumentType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the classification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub document_type: DocumentType,
}

/// A successfully analysed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedFile {
    pub filename: String,
    pub document_type: DocumentType,
    /// Whatever JSON object the analysis call produced, passed through as-is.
    pub analysis: JsonObject,
    /// Leading excerpt of the extracted text.
    pub extracted_text: String,
}

/// Per-file result of the document pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Success(AnalyzedFile),
    Failed { filename: String, error: String },
}

impl FileOutcome {
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        FileOutcome::Failed {
            filename: filename.into(),
            error: error.into(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            FileOutcome::Success(f) => &f.filename,
            FileOutcome::Failed { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FileOutcome::Success(_) => None,
            FileOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Independent-mode batch result. `results` is in upload order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<FileOutcome>,
}

impl BatchOutcome {
    pub fn from_results(results: Vec<FileOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total_files: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

/// Metadata about one file that took part in a consolidated analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub document_type: DocumentType,
    /// Length of the excerpt contributed to the combined text, in characters.
    pub text_length: usize,
}

/// Always `"success"`; present so clients can switch on a single field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Success,
}

/// Consolidated-mode batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedOutcome {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub file_info: Vec<FileInfo>,
    pub consolidated_analysis: JsonObject,
    pub status: BatchStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extension_is_lowercased() {
        let f = UploadedFile::new("Report.PDF", b"x".to_vec());
        assert_eq!(f.extension, "pdf");
        assert_eq!(f.dotted_extension(), ".pdf");

        let f = UploadedFile::new("README", Vec::new());
        assert_eq!(f.extension, "");
        assert_eq!(f.dotted_extension(), "");
    }

    #[test]
    fn document_type_round_trips_known_and_unknown() {
        assert_eq!(DocumentType::from("Invoice"), DocumentType::Invoice);
        assert_eq!(
            DocumentType::from("Receipt"),
            DocumentType::Other("Receipt".into())
        );
        assert_eq!(
            serde_json::to_value(DocumentType::ProfitAndLossStatement).unwrap(),
            json!("ProfitAndLossStatement")
        );
        assert_eq!(
            serde_json::to_value(DocumentType::Other("Memo".into())).unwrap(),
            json!("Memo")
        );
    }

    #[test]
    fn classification_serialises_flat() {
        let c = Classification {
            document_type: DocumentType::GeneralDocument,
        };
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({ "document_type": "GeneralDocument" })
        );
    }

    #[test]
    fn file_outcome_wire_shape() {
        let failed = FileOutcome::failed("a.pdf", "boom");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "status": "failed", "filename": "a.pdf", "error": "boom" })
        );

        let ok = FileOutcome::Success(AnalyzedFile {
            filename: "b.csv".into(),
            document_type: DocumentType::Invoice,
            analysis: JsonObject::new(),
            extracted_text: "hello".into(),
        });
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["document_type"], "Invoice");
        assert_eq!(v["extracted_text"], "hello");
    }

    #[test]
    fn batch_counts() {
        let batch = BatchOutcome::from_results(vec![
            FileOutcome::failed("a", "x"),
            FileOutcome::failed("b", "y"),
        ]);
        assert_eq!(batch.total_files, 2);
        assert_eq!(batch.successful, 0);
        assert_eq!(batch.failed, 2);
    }
}
