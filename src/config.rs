//! Configuration types for document analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built
//! once at process start (via [`AnalysisConfig::from_env`] or its
//! [`AnalysisConfigBuilder`]) and passed by reference into the
//! [`crate::Analyzer`]. Library code never reads the environment itself.

use crate::error::AnalysisError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the builder nor `OPENAI_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Provider used when neither the builder nor `EDGEQUAKE_LLM_PROVIDER` names one.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Delay function: receives the 1-based number of the attempt about to run
/// (always ≥ 2) and returns how long to wait before it.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How many times an LLM call is attempted before falling back.
///
/// The default is three attempts back to back with no delay. A delay
/// function can be injected; tests use [`RetryPolicy::fixed`] so they never
/// sleep.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Option<DelayFn>,
}

impl RetryPolicy {
    /// `max_attempts` tries, no delay between them. Clamped to at least 1.
    pub fn fixed(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: None,
        }
    }

    /// Add a delay before every attempt after the first.
    pub fn with_delay(mut self, delay: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before `attempt` (1-based). `None` for the first
    /// attempt or when no delay function is set.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return None;
        }
        self.delay
            .as_ref()
            .map(|f| f(attempt))
            .filter(|d| !d.is_zero())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Configuration for document analysis.
///
/// # Example
/// ```rust
/// use edgequake_docanalyze::{AnalysisConfig, RetryPolicy};
///
/// let config = AnalysisConfig::builder()
///     .model("gpt-4o-mini")
///     .retry(RetryPolicy::fixed(3))
///     .max_batch_files(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_batch_files, 5);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// LLM model identifier. Default: `gpt-4o`.
    pub model: String,

    /// LLM provider name passed to `ProviderFactory`. Default: `openai`.
    pub provider_name: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Credential for the provider. Only checked for presence; never logged.
    pub api_key: Option<String>,

    /// Retry policy shared by every LLM call.
    pub retry: RetryPolicy,

    /// Temperature for the classification call. Default: 0.2.
    pub classification_temperature: f32,

    /// Temperature for the single-document analysis call. Default: 0.2.
    pub analysis_temperature: f32,

    /// Temperature for the consolidated call. Default: 0.3.
    pub consolidated_temperature: f32,

    /// Output-token cap for the consolidated call. Default: 3000.
    pub consolidated_max_tokens: usize,

    /// Characters of extracted text sent to the classifier. Default: 4000.
    pub classification_chars: usize,

    /// Characters of combined text sent to the consolidated call. Default: 8000.
    pub consolidated_chars: usize,

    /// Characters of extracted text kept in each file outcome. Default: 1000.
    pub excerpt_chars: usize,

    /// Maximum files per batch request. Default: 10.
    pub max_batch_files: usize,

    /// Transcribe png/jpg uploads with the vision model. Default: true.
    pub ocr_images: bool,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            provider: None,
            api_key: None,
            retry: RetryPolicy::default(),
            classification_temperature: 0.2,
            analysis_temperature: 0.2,
            consolidated_temperature: 0.3,
            consolidated_max_tokens: 3000,
            classification_chars: 4000,
            consolidated_chars: 8000,
            excerpt_chars: 1000,
            max_batch_files: 10,
            ocr_images: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .field("classification_chars", &self.classification_chars)
            .field("consolidated_chars", &self.consolidated_chars)
            .field("excerpt_chars", &self.excerpt_chars)
            .field("max_batch_files", &self.max_batch_files)
            .field("ocr_images", &self.ocr_images)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_MODEL` and `EDGEQUAKE_LLM_PROVIDER`
    /// from the process environment. Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`AnalysisConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        config.api_key = get("OPENAI_API_KEY");
        if let Some(model) = get("OPENAI_MODEL") {
            config.model = model;
        }
        if let Some(provider) = get("EDGEQUAKE_LLM_PROVIDER") {
            config.provider_name = provider;
        }
        config
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Start from an existing config (e.g. one read by `from_env`).
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.config.retry = RetryPolicy::fixed(attempts);
        self
    }

    pub fn classification_temperature(mut self, t: f32) -> Self {
        self.config.classification_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn analysis_temperature(mut self, t: f32) -> Self {
        self.config.analysis_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn consolidated_temperature(mut self, t: f32) -> Self {
        self.config.consolidated_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn consolidated_max_tokens(mut self, n: usize) -> Self {
        self.config.consolidated_max_tokens = n;
        self
    }

    pub fn classification_chars(mut self, n: usize) -> Self {
        self.config.classification_chars = n;
        self
    }

    pub fn consolidated_chars(mut self, n: usize) -> Self {
        self.config.consolidated_chars = n;
        self
    }

    pub fn excerpt_chars(mut self, n: usize) -> Self {
        self.config.excerpt_chars = n;
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = n;
        self
    }

    pub fn ocr_images(mut self, v: bool) -> Self {
        self.config.ocr_images = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.max_batch_files == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_batch_files must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("model must not be empty".into()));
        }
        if c.classification_chars == 0 || c.consolidated_chars == 0 {
            return Err(AnalysisError::InvalidConfig(
                "character limits must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
