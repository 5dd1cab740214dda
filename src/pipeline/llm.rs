//! LLM interaction: JSON-contracted chat calls with fixed-count retries.
//!
//! Every model call in the pipeline goes through [`JsonLlmClient::invoke`]:
//!
//! 1. send one system message and one user message, asking for a JSON
//!    object reply (`response_format = "json_object"`);
//! 2. parse the reply (an outer ```` ```json ```` fence is tolerated);
//! 3. on any failure (transport error, empty reply, invalid JSON) try again,
//!    up to [`RetryPolicy::max_attempts`], waiting only if the policy has a
//!    delay function;
//! 4. when every attempt failed, return the caller's fallback object.
//!
//! `invoke` never returns an error. Callers receive a [`JsonReply`]: a JSON
//! object, or the string form of any other JSON value. Each call site
//! collapses that into an object before it leaves this module, so the
//! pipeline never has to handle an unexpected shape.
//!
//! The actual transport sits behind [`ChatBackend`]; [`ProviderBackend`]
//! adapts any `edgequake_llm` provider, and tests plug in scripted backends.

use crate::config::{AnalysisConfig, RetryPolicy};
use crate::error::{AnalysisError, LlmCallError};
use crate::output::{Classification, DocumentType, FileInfo, JsonObject};
use crate::pipeline::postprocess::{strip_json_fences, truncate_chars};
use crate::prompts::{
    analysis_system_prompt, consolidated_prompt, CLASSIFICATION_PROMPT,
    CONSOLIDATED_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One chat round-trip: a system message plus a user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Images attached to the user message (OCR only).
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    /// Ask the provider for a strict JSON-object reply.
    pub json_object: bool,
}

impl ChatRequest {
    /// A text-only request expecting a JSON object back.
    pub fn json(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
        max_tokens: Option<usize>,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            images: Vec::new(),
            temperature,
            max_tokens,
            json_object: true,
        }
    }
}

/// Sends a chat request and returns the model's raw text reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmCallError>;
}

/// [`ChatBackend`] over an `edgequake_llm` provider (OpenAI, Anthropic, …).
///
/// The model is fixed when the provider is created.
#[derive(Clone)]
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmCallError> {
        let user = if request.images.is_empty() {
            ChatMessage::user(request.user.as_str())
        } else {
            ChatMessage::user_with_images(request.user.as_str(), request.images.clone())
        };
        let messages = vec![ChatMessage::system(request.system.as_str()), user];
        let options = build_options(request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| LlmCallError::Request(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from a request.
fn build_options(request: &ChatRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: request.max_tokens,
        response_format: request.json_object.then(|| "json_object".to_string()),
        ..Default::default()
    }
}

/// A parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonReply {
    /// The reply was a JSON object.
    Structured(JsonObject),
    /// Any other JSON value, in string form (strings unquoted).
    Scalar(String),
}

impl JsonReply {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => JsonReply::Structured(map),
            Value::String(s) => JsonReply::Scalar(s),
            other => JsonReply::Scalar(other.to_string()),
        }
    }

    /// Collapse into an object, wrapping a scalar as `{ sentinel: scalar }`.
    pub fn into_object(self, sentinel: &str) -> JsonObject {
        match self {
            JsonReply::Structured(map) => map,
            JsonReply::Scalar(s) => {
                let mut map = JsonObject::new();
                map.insert(sentinel.to_string(), Value::String(s));
                map
            }
        }
    }
}

/// Per-call tuning taken from [`AnalysisConfig`].
#[derive(Debug, Clone)]
struct CallSettings {
    classification_temperature: f32,
    analysis_temperature: f32,
    consolidated_temperature: f32,
    consolidated_max_tokens: usize,
    classification_chars: usize,
    consolidated_chars: usize,
}

/// The LLM client wrapper used by the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct JsonLlmClient {
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    settings: CallSettings,
}

impl JsonLlmClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &AnalysisConfig) -> Self {
        Self {
            backend,
            retry: config.retry.clone(),
            settings: CallSettings {
                classification_temperature: config.classification_temperature,
                analysis_temperature: config.analysis_temperature,
                consolidated_temperature: config.consolidated_temperature,
                consolidated_max_tokens: config.consolidated_max_tokens,
                classification_chars: config.classification_chars,
                consolidated_chars: config.consolidated_chars,
            },
        }
    }

    /// Run `request` under the retry policy; `fallback` once attempts run out.
    pub async fn invoke(&self, label: &str, request: &ChatRequest, fallback: JsonObject) -> JsonReply {
        let max = self.retry.max_attempts();
        for attempt in 1..=max {
            if let Some(delay) = self.retry.delay_before(attempt) {
                tokio::time::sleep(delay).await;
            }
            info!("{}: attempt {}/{}", label, attempt, max);
            match self.attempt(request).await {
                Ok(reply) => return reply,
                Err(e) => warn!("{}: attempt {} failed: {}", label, attempt, e),
            }
        }
        error!("{}: all {} attempts failed, using fallback", label, max);
        JsonReply::Structured(fallback)
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<JsonReply, LlmCallError> {
        let content = self.backend.complete(request).await?;
        if content.trim().is_empty() {
            return Err(LlmCallError::EmptyReply);
        }
        debug!("LLM reply: {}", content);
        let value: Value = serde_json::from_str(strip_json_fences(&content))?;
        Ok(JsonReply::from_value(value))
    }

    /// Classify extracted text into a [`DocumentType`].
    ///
    /// Only the first `classification_chars` characters are sent. Falls back
    /// to `GeneralDocument`.
    pub async fn classify(&self, text: &str) -> Classification {
        info!("Classifying document type...");
        let request = ChatRequest::json(
            CLASSIFICATION_PROMPT,
            truncate_chars(text, self.settings.classification_chars),
            self.settings.classification_temperature,
            None,
        );
        let fallback = classification_fallback();
        let mut object = self
            .invoke("classification", &request, fallback)
            .await
            .into_object("document_type");

        let document_type = match object.remove("document_type") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => {
                warn!("Unexpected classification format.");
                Value::Object(object).to_string()
            }
        };
        Classification {
            document_type: DocumentType::from(document_type),
        }
    }

    /// Analyse the full extracted text with the classified type as context.
    ///
    /// Any JSON object the model returns is passed through untouched; other
    /// values become `{"analysis_output": ...}`.
    pub async fn analyze_single(&self, text: &str, document_type: &DocumentType) -> JsonObject {
        info!("Analyzing document. Type: {}", document_type);
        let request = ChatRequest::json(
            analysis_system_prompt(document_type.as_str()),
            text,
            self.settings.analysis_temperature,
            None,
        );
        let reply = self.invoke("analysis", &request, analysis_fallback()).await;
        if let JsonReply::Scalar(_) = reply {
            warn!("LLM returned non-object analysis result. Wrapping it.");
        }
        reply.into_object("analysis_output")
    }

    /// One analysis over the concatenated text of several documents.
    ///
    /// `combined_text` is cut to `consolidated_chars` characters here.
    pub async fn analyze_consolidated(
        &self,
        combined_text: &str,
        files: &[FileInfo],
    ) -> Result<JsonObject, AnalysisError> {
        info!("Performing consolidated analysis of {} documents", files.len());
        let file_info_json = serde_json::to_string_pretty(files)
            .map_err(|e| AnalysisError::Internal(format!("file info serialisation: {e}")))?;
        let user = consolidated_prompt(
            files,
            &file_info_json,
            truncate_chars(combined_text, self.settings.consolidated_chars),
        );
        let request = ChatRequest::json(
            CONSOLIDATED_SYSTEM_PROMPT,
            user,
            self.settings.consolidated_temperature,
            Some(self.settings.consolidated_max_tokens),
        );

        match self
            .invoke("consolidated analysis", &request, consolidated_fallback())
            .await
        {
            JsonReply::Structured(map) => Ok(map),
            JsonReply::Scalar(_) => {
                warn!("Unexpected consolidated analysis format.");
                Ok(as_object(json!({
                    "comprehensive_summary": "Analysis completed but format was unexpected",
                    "detailed_recommendations": ["Please check document format"],
                })))
            }
        }
    }
}

/// `{"document_type": "GeneralDocument"}`
pub fn classification_fallback() -> JsonObject {
    as_object(json!({ "document_type": "GeneralDocument" }))
}

/// `{"error": "Failed to analyze document."}`
pub fn analysis_fallback() -> JsonObject {
    as_object(json!({ "error": "Failed to analyze document." }))
}

/// Consolidated-call fallback.
pub fn consolidated_fallback() -> JsonObject {
    as_object(json!({
        "comprehensive_summary": "Failed to analyze documents",
        "detailed_recommendations": ["Please try again or check document format"],
    }))
}

fn as_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies; `Err` entries simulate transport failures.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmCallError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(s)) => Ok(s),
                Some(Err(e)) => Err(LlmCallError::Request(e)),
                None => Err(LlmCallError::Request("script exhausted".into())),
            }
        }
    }

    fn client(backend: Arc<Scripted>) -> JsonLlmClient {
        JsonLlmClient::new(backend, &AnalysisConfig::default())
    }

    #[test]
    fn build_options_json_mode() {
        let req = ChatRequest::json("s", "u", 0.3, Some(3000));
        let opts = build_options(&req);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(3000));
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
    }

    #[test]
    fn reply_shapes() {
        assert_eq!(
            JsonReply::from_value(json!("Invoice")),
            JsonReply::Scalar("Invoice".into())
        );
        assert_eq!(JsonReply::from_value(json!([1, 2])), JsonReply::Scalar("[1,2]".into()));
        let obj = JsonReply::Scalar("hello".into()).into_object("analysis_output");
        assert_eq!(Value::Object(obj), json!({ "analysis_output": "hello" }));
    }

    #[tokio::test]
    async fn third_attempt_succeeds() {
        let backend = Scripted::new(vec![
            Err("connection reset"),
            Ok("not json at all"),
            Ok(r#"{"document_type": "Invoice"}"#),
        ]);
        let c = client(backend.clone()).classify("INVOICE #1").await;
        assert_eq!(c.document_type, DocumentType::Invoice);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn classify_falls_back_after_three_failures() {
        let backend = Scripted::new(vec![Err("a"), Err("b"), Err("c"), Ok(r#"{"document_type": "Invoice"}"#)]);
        let c = client(backend.clone()).classify("text").await;
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({ "document_type": "GeneralDocument" })
        );
        assert_eq!(backend.calls(), 3, "must stop at the retry bound");
    }

    #[tokio::test]
    async fn classify_truncates_to_4000_chars() {
        let backend = Scripted::new(vec![Ok(r#"{"document_type": "Contract"}"#)]);
        let text = "é".repeat(5000);
        let c = client(backend.clone()).classify(&text).await;
        assert_eq!(c.document_type, DocumentType::Contract);
        let req = &backend.requests.lock().unwrap()[0];
        assert_eq!(req.user.chars().count(), 4000);
        assert_eq!(req.temperature, 0.2);
        assert!(req.json_object);
    }

    #[tokio::test]
    async fn classify_scalar_and_missing_key() {
        let backend = Scripted::new(vec![Ok(r#""Receipt""#)]);
        let c = client(backend).classify("x").await;
        assert_eq!(c.document_type, DocumentType::Other("Receipt".into()));

        let backend = Scripted::new(vec![Ok(r#"{"type": "Invoice"}"#)]);
        let c = client(backend).classify("x").await;
        assert_eq!(c.document_type.as_str(), r#"{"type":"Invoice"}"#);
    }

    #[tokio::test]
    async fn analysis_passes_object_through() {
        let reply = r#"{"language": "Dutch", "extra": {"n": 1}, "actionable_recommendations": ["Pay"]}"#;
        let backend = Scripted::new(vec![Ok(reply)]);
        let long_text = "x".repeat(20_000);
        let out = client(backend.clone())
            .analyze_single(&long_text, &DocumentType::Invoice)
            .await;
        assert_eq!(Value::Object(out), serde_json::from_str::<Value>(reply).unwrap());
        let req = &backend.requests.lock().unwrap()[0];
        assert_eq!(req.user.len(), 20_000, "analysis input is not truncated");
        assert!(req.system.contains("pre-classified as: Invoice"));
    }

    #[tokio::test]
    async fn analysis_wraps_scalar_and_falls_back() {
        let backend = Scripted::new(vec![Ok("```json\n\"just words\"\n```")]);
        let out = client(backend).analyze_single("t", &DocumentType::GeneralDocument).await;
        assert_eq!(Value::Object(out), json!({ "analysis_output": "just words" }));

        let backend = Scripted::new(vec![Ok(""), Ok("   "), Err("503")]);
        let out = client(backend).analyze_single("t", &DocumentType::GeneralDocument).await;
        assert_eq!(Value::Object(out), json!({ "error": "Failed to analyze document." }));
    }

    #[tokio::test]
    async fn consolidated_request_shape() {
        let backend = Scripted::new(vec![Ok(r#"{"comprehensive_summary": "ok", "key_findings": []}"#)]);
        let files = vec![FileInfo {
            filename: "a.pdf".into(),
            document_type: DocumentType::Invoice,
            text_length: 9000,
        }];
        let combined = "z".repeat(9000);
        let out = client(backend.clone())
            .analyze_consolidated(&combined, &files)
            .await
            .unwrap();
        assert_eq!(out["comprehensive_summary"], "ok");

        let req = &backend.requests.lock().unwrap()[0];
        assert_eq!(req.system, CONSOLIDATED_SYSTEM_PROMPT);
        assert_eq!(req.max_tokens, Some(3000));
        assert_eq!(req.temperature, 0.3);
        assert!(req.user.contains(&"z".repeat(8000)));
        assert!(!req.user.contains(&"z".repeat(8001)));
        assert!(req.user.contains("\"filename\": \"a.pdf\""));
    }

    #[tokio::test]
    async fn consolidated_fallback_and_unexpected_format() {
        let backend = Scripted::new(vec![Err("x"), Err("y"), Err("z")]);
        let out = client(backend).analyze_consolidated("t", &[]).await.unwrap();
        assert_eq!(Value::Object(out), Value::Object(consolidated_fallback()));

        let backend = Scripted::new(vec![Ok("[1, 2, 3]")]);
        let out = client(backend).analyze_consolidated("t", &[]).await.unwrap();
        assert_eq!(
            out["comprehensive_summary"],
            "Analysis completed but format was unexpected"
        );
    }

    #[tokio::test]
    async fn delay_function_runs_between_attempts() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::time::Duration;

        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let config = AnalysisConfig::builder()
            .retry(RetryPolicy::fixed(3).with_delay(move |attempt| {
                seen.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(10 * attempt as u64)
            }))
            .build()
            .unwrap();
        let backend = Scripted::new(vec![Err("a"), Err("b"), Ok(r#"{"document_type": "Contract"}"#)]);
        let c = JsonLlmClient::new(backend, &config).classify("t").await;
        assert_eq!(c.document_type, DocumentType::Contract);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
