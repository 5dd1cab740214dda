//! HTTP service over the [`Analyzer`].
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `GET /health` | none | `{"status": "ok"}` |
//! | `POST /analyze` | multipart `file` | one successful [`FileOutcome`] |
//! | `POST /analyze-multiple` | multipart `files` (repeated) | [`crate::BatchOutcome`] |
//! | `POST /analyze-consolidated` | multipart `files` (repeated) | [`crate::ConsolidatedOutcome`] |
//!
//! Errors are rendered as `{"detail": "<message>"}` with the status from
//! [`AnalysisError::status_code`].

use crate::analyze::Analyzer;
use crate::error::AnalysisError;
use crate::output::{FileOutcome, UploadedFile};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Default request body cap: 100 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024 * 1024;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Analyzer,
}

/// Create the router with all routes.
pub fn create_router(analyzer: Analyzer, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/analyze-multiple", post(analyze_multiple))
        .route("/analyze-consolidated", post(analyze_consolidated))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(AppState { analyzer })
}

/// Bind `host:port` and serve until the process is stopped.
pub async fn serve(
    analyzer: Analyzer,
    host: &str,
    port: u16,
    body_limit: usize,
) -> std::io::Result<()> {
    let app = create_router(analyzer, body_limit);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Starting server at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FileOutcome>, AnalysisError> {
    let file = read_first_file(multipart, "file")
        .await?
        .ok_or(AnalysisError::NoFiles)?;
    let analyzed = state.analyzer.analyze_file(file).await?;
    Ok(Json(FileOutcome::Success(analyzed)))
}

async fn analyze_multiple(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<crate::BatchOutcome>, AnalysisError> {
    let max = state.analyzer.config().max_batch_files;
    let files = read_files(multipart, "files", max).await?;
    Ok(Json(state.analyzer.analyze_multiple(files).await?))
}

async fn analyze_consolidated(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<crate::ConsolidatedOutcome>, AnalysisError> {
    let max = state.analyzer.config().max_batch_files;
    let files = read_files(multipart, "files", max).await?;
    Ok(Json(state.analyzer.analyze_consolidated(files).await?))
}

/// Buffer the first multipart field named `field_name`; later fields are
/// never read.
async fn read_first_file(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Option<UploadedFile>, AnalysisError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnalysisError::Multipart(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AnalysisError::Multipart(e.to_string()))?;
        return Ok(Some(UploadedFile::new(filename, bytes.to_vec())));
    }
    Ok(None)
}

/// Collect every multipart field named `field_name`.
///
/// Reading stops with [`AnalysisError::TooManyFiles`] as soon as file
/// `max + 1` is seen, before its bytes are buffered.
async fn read_files(
    mut multipart: Multipart,
    field_name: &str,
    max: usize,
) -> Result<Vec<UploadedFile>, AnalysisError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnalysisError::Multipart(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        if files.len() >= max {
            return Err(AnalysisError::TooManyFiles {
                max,
                got: files.len() + 1,
            });
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AnalysisError::Multipart(e.to_string()))?;
        files.push(UploadedFile::new(filename, bytes.to_vec()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::error::{ExtractError, LlmCallError};
    use crate::pipeline::extract::TextExtractor;
    use crate::pipeline::llm::{ChatBackend, ChatRequest};
    use crate::prompts::CLASSIFICATION_PROMPT;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Canned;

    #[async_trait]
    impl ChatBackend for Canned {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmCallError> {
            Ok(if request.system == CLASSIFICATION_PROMPT {
                r#"{"document_type": "Contract"}"#.into()
            } else {
                r#"{"comprehensive_summary": "ok", "language": "English"}"#.into()
            })
        }
    }

    struct BytesAsText;

    #[async_trait]
    impl TextExtractor for BytesAsText {
        async fn extract(&self, _path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
            if bytes == b"panic" {
                panic!("decoder crashed");
            }
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    fn app() -> Router {
        let analyzer = Analyzer::with_backend(
            AnalysisConfig::default(),
            Arc::new(Canned),
            Arc::new(BytesAsText),
        );
        create_router(analyzer, DEFAULT_BODY_LIMIT)
    }

    const BOUNDARY: &str = "docanalyze-test-boundary";

    fn multipart_request(uri: &str, field: &str, files: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_analyze_single() {
        let response = app()
            .oneshot(multipart_request("/analyze", "file", &[("deal.docx", "terms")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["filename"], "deal.docx");
        assert_eq!(json["document_type"], "Contract");
        assert_eq!(json["analysis"]["language"], "English");
        assert_eq!(json["extracted_text"], "terms");
    }

    #[tokio::test]
    async fn test_analyze_rejects_unsupported_type() {
        let response = app()
            .oneshot(multipart_request("/analyze", "file", &[("notes.txt", "hi")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Unsupported file type: .txt"));
    }

    #[tokio::test]
    async fn test_analyze_empty_text_is_500() {
        let response = app()
            .oneshot(multipart_request("/analyze", "file", &[("empty.csv", "   ")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Failed to extract text from document." })
        );
    }

    #[tokio::test]
    async fn test_analyze_panic_is_500_with_detail() {
        let response = app()
            .oneshot(multipart_request("/analyze", "file", &[("boom.pdf", "panic")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Processing task failed"));
    }

    #[tokio::test]
    async fn test_analyze_uses_first_file_field_only() {
        // The second part is cut off mid-body; reading it would fail the
        // request with a multipart error.
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"deal.docx\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nterms\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"extra.docx\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nnever finish"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["filename"], "deal.docx");
        assert_eq!(json["extracted_text"], "terms");
    }

    #[tokio::test]
    async fn test_analyze_multiple_keeps_order() {
        let response = app()
            .oneshot(multipart_request(
                "/analyze-multiple",
                "files",
                &[("a.csv", "one"), ("b.exe", "two"), ("c.csv", "three")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["total_files"], 3);
        assert_eq!(json["successful"], 2);
        assert_eq!(json["failed"], 1);
        let names: Vec<_> = json["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["filename"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.csv", "b.exe", "c.csv"]);
        assert_eq!(json["results"][1]["status"], "failed");
    }

    #[tokio::test]
    async fn test_too_many_files() {
        let names: Vec<String> = (0..11).map(|i| format!("f{i}.csv")).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x")).collect();
        let response = app()
            .oneshot(multipart_request("/analyze-consolidated", "files", &files))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Maximum 10 files allowed per request" })
        );
    }

    #[tokio::test]
    async fn test_consolidated_all_failed_is_422() {
        let response = app()
            .oneshot(multipart_request(
                "/analyze-consolidated",
                "files",
                &[("a.csv", " "), ("b.zip", "PK")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "No files could be processed successfully" })
        );
    }

    #[tokio::test]
    async fn test_consolidated_success() {
        let response = app()
            .oneshot(multipart_request(
                "/analyze-consolidated",
                "files",
                &[("a.csv", "alpha"), ("b.csv", "beta")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["successful_files"], 2);
        assert_eq!(json["file_info"][0]["document_type"], "Contract");
        assert_eq!(json["consolidated_analysis"]["comprehensive_summary"], "ok");
    }

    #[tokio::test]
    async fn test_missing_field_is_400() {
        let response = app()
            .oneshot(multipart_request("/analyze-multiple", "wrong", &[("a.csv", "x")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "detail": "No files provided" }));
    }
}
