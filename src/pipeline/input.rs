//! Input handling: extension validation, scoped temp files, and loading
//! uploads from local paths or URLs.
//!
//! Some extractors (calamine) need a file-system path rather than a byte
//! buffer, so every upload is staged into a [`NamedTempFile`] that keeps the
//! original suffix. The file is removed when the [`StagedUpload`] is dropped,
//! on success, on error, and on panic alike.

use crate::error::AnalysisError;
use crate::output::UploadedFile;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Extensions (lower-case, without the dot) the pipeline accepts.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["pdf", "docx", "csv", "xlsx", "png", "jpg", "jpeg"];

/// `".pdf, .docx, …"` for error messages.
pub fn allowed_extensions_display() -> String {
    ALLOWED_EXTENSIONS
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn is_supported_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Reject uploads whose extension is not in [`ALLOWED_EXTENSIONS`].
pub fn validate_file(file: &UploadedFile) -> Result<(), AnalysisError> {
    if is_supported_extension(&file.extension) {
        Ok(())
    } else {
        Err(AnalysisError::UnsupportedFileType {
            extension: file.dotted_extension(),
            allowed: allowed_extensions_display(),
        })
    }
}

/// An upload written to a temporary file. Deleted on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Write the upload's bytes to a fresh temp file with the same suffix.
pub async fn stage_upload(file: &UploadedFile) -> std::io::Result<StagedUpload> {
    let tmp = tempfile::Builder::new()
        .prefix("docanalyze-")
        .suffix(&file.dotted_extension())
        .tempfile()?;
    tokio::fs::write(tmp.path(), &file.content).await?;
    debug!(
        "Staged '{}' ({} bytes) at {}",
        file.filename,
        file.content.len(),
        tmp.path().display()
    );
    Ok(StagedUpload { file: tmp })
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL into an [`UploadedFile`].
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<UploadedFile, AnalysisError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<UploadedFile, AnalysisError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AnalysisError::InputNotFound { path: path.clone() },
        _ => AnalysisError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Loaded local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(UploadedFile::new(filename, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedFile, AnalysisError> {
    info!("Downloading document from: {}", url);
    let failed = |reason: String| AnalysisError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Ok(UploadedFile::new(filename, bytes.to_vec()))
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_allowed_extension_validates() {
        for ext in ALLOWED_EXTENSIONS {
            let f = UploadedFile::new(format!("doc.{ext}"), Vec::new());
            assert!(validate_file(&f).is_ok(), "{ext} should pass");
            let upper = UploadedFile::new(format!("DOC.{}", ext.to_uppercase()), Vec::new());
            assert!(validate_file(&upper).is_ok(), "{ext} uppercase should pass");
        }
    }

    #[test]
    fn other_extensions_are_client_errors() {
        for name in ["a.exe", "b.txt", "c.xls", "noext", "d.pdf.zip"] {
            let f = UploadedFile::new(name, Vec::new());
            let err = validate_file(&f).unwrap_err();
            assert!(err.is_client_error(), "{name}");
            assert!(err.to_string().contains(".pdf, .docx, .csv"), "{err}");
        }
    }

    #[tokio::test]
    async fn staged_upload_is_removed_on_drop() {
        let f = UploadedFile::new("sheet.csv", b"a,b\n1,2\n".to_vec());
        let staged = stage_upload(&f).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        assert_eq!(std::fs::read(&path).unwrap(), f.content);
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_filename() {
        assert_eq!(filename_from_url("https://x.org/files/inv-7.pdf"), "inv-7.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_keeps_basename() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Ledger.XLSX");
        std::fs::write(&p, b"fake").unwrap();
        let f = load_input(p.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(f.filename, "Ledger.XLSX");
        assert_eq!(f.extension, "xlsx");
        assert_eq!(f.content, b"fake");
    }
}
