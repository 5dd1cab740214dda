//! Document pipeline and batch orchestration.
//!
//! [`Analyzer`] owns the three collaborators every request needs (the
//! configuration, the JSON LLM client and the text extractor) and exposes
//! the entry points used by the HTTP service and the CLI:
//!
//! | Entry point | Mode |
//! |-------------|------|
//! | [`Analyzer::analyze_file`] | one upload, a failed outcome becomes an error |
//! | [`Analyzer::analyze_multiple`] | independent: every file runs concurrently |
//! | [`Analyzer::analyze_consolidated`] | sequential per-file runs, then one cross-document call |
//!
//! Per-file failures never abort a batch. Each upload runs in its own tokio
//! task, so even a panicking extractor only turns that one file into a
//! `failed` outcome.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::output::{
    AnalyzedFile, BatchOutcome, BatchStatus, ConsolidatedOutcome, FileInfo, FileOutcome,
    UploadedFile,
};
use crate::pipeline::extract::{NativeExtractor, TextExtractor};
use crate::pipeline::input::{stage_upload, validate_file};
use crate::pipeline::llm::{ChatBackend, JsonLlmClient, ProviderBackend};
use crate::pipeline::postprocess::truncate_chars;
use crate::prompts::DOCUMENT_SEPARATOR;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Message recorded when extraction yields no usable text.
pub const EMPTY_TEXT_ERROR: &str = "Failed to extract text from document.";

/// Runs uploads through extraction, classification and analysis.
///
/// Cheap to clone; clones share the provider, extractor and config.
#[derive(Clone)]
pub struct Analyzer {
    config: Arc<AnalysisConfig>,
    llm: JsonLlmClient,
    extractor: Arc<dyn TextExtractor>,
}

impl Analyzer {
    /// Build an analyzer backed by the configured `edgequake_llm` provider.
    ///
    /// Image uploads are transcribed by the same provider unless
    /// `config.ocr_images` is off.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let provider = resolve_provider(&config)?;
        if config.provider.is_none() {
            info!(
                "Using LLM provider '{}' with model '{}'",
                config.provider_name, config.model
            );
        }
        let backend: Arc<dyn ChatBackend> = Arc::new(ProviderBackend::new(provider));
        let extractor = if config.ocr_images {
            NativeExtractor::with_ocr(Arc::clone(&backend))
        } else {
            NativeExtractor::new()
        };
        Ok(Self::with_backend(config, backend, Arc::new(extractor)))
    }

    /// Build an analyzer from explicit collaborators.
    pub fn with_backend(
        config: AnalysisConfig,
        backend: Arc<dyn ChatBackend>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let llm = JsonLlmClient::new(backend, &config);
        Self {
            config: Arc::new(config),
            llm,
            extractor,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run one upload through the document pipeline.
    ///
    /// Only an unsupported extension is an `Err`; everything that goes wrong
    /// after validation is reported as [`FileOutcome::Failed`].
    pub async fn process_file(&self, file: &UploadedFile) -> Result<FileOutcome, AnalysisError> {
        validate_file(file)?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_start(&file.filename);
        }

        let start = Instant::now();
        let outcome = self.run_pipeline(file).await;
        debug!(
            "'{}' finished in {}ms",
            file.filename,
            start.elapsed().as_millis()
        );

        if let Some(ref cb) = self.config.progress_callback {
            match &outcome {
                FileOutcome::Success(a) => cb.on_file_complete(&a.filename, a.document_type.as_str()),
                FileOutcome::Failed { filename, error } => cb.on_file_error(filename, error),
            }
        }
        Ok(outcome)
    }

    /// Single-file mode: a failed outcome is returned as
    /// [`AnalysisError::FileFailed`] carrying the failure message.
    ///
    /// The upload runs in its own task like a batch member, so a panic
    /// surfaces as `"Processing task failed: …"` instead of unwinding
    /// into the caller.
    pub async fn analyze_file(&self, file: UploadedFile) -> Result<AnalyzedFile, AnalysisError> {
        info!("Analyzing file: {}", file.filename);
        validate_file(&file)?;
        match self.isolated_outcome(file).await {
            FileOutcome::Success(analyzed) => Ok(analyzed),
            FileOutcome::Failed { filename, error } => {
                Err(AnalysisError::FileFailed { filename, error })
            }
        }
    }

    /// Reject empty batches and batches over `max_batch_files`.
    pub fn check_batch(&self, count: usize) -> Result<(), AnalysisError> {
        if count == 0 {
            return Err(AnalysisError::NoFiles);
        }
        if count > self.config.max_batch_files {
            return Err(AnalysisError::TooManyFiles {
                max: self.config.max_batch_files,
                got: count,
            });
        }
        Ok(())
    }

    /// Independent mode: every file is processed concurrently; `results`
    /// keeps upload order.
    pub async fn analyze_multiple(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<BatchOutcome, AnalysisError> {
        self.check_batch(files.len())?;
        let total = files.len();
        info!("Analyzing {} files independently", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let filename = file.filename.clone();
                let this = self.clone();
                (filename, tokio::spawn(async move { this.outcome_for(file).await }))
            })
            .collect();

        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(idx, (filename, handle))| async move { (idx, filename, handle.await) })
            .collect();

        let mut indexed = Vec::with_capacity(total);
        while let Some((idx, filename, joined)) = pending.next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!("Task for '{}' did not complete: {}", filename, e);
                FileOutcome::failed(filename, format!("Processing task failed: {e}"))
            });
            indexed.push((idx, outcome));
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        let batch = BatchOutcome::from_results(indexed.into_iter().map(|(_, o)| o).collect());
        info!(
            "Batch complete: {}/{} files succeeded",
            batch.successful, batch.total_files
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(batch.total_files, batch.successful);
        }
        Ok(batch)
    }

    /// Consolidated mode: files run one after another, then a single LLM
    /// call analyses the joined excerpts of the successful ones.
    ///
    /// Fails with [`AnalysisError::NoFilesProcessed`] when no file
    /// succeeded; the consolidated call is not made in that case.
    pub async fn analyze_consolidated(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<ConsolidatedOutcome, AnalysisError> {
        self.check_batch(files.len())?;
        let total = files.len();
        info!("Consolidated analysis of {} files", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut file_info = Vec::new();
        let mut excerpts = Vec::new();
        for file in files {
            match self.isolated_outcome(file).await {
                FileOutcome::Success(analyzed) => {
                    file_info.push(FileInfo {
                        filename: analyzed.filename,
                        document_type: analyzed.document_type,
                        text_length: analyzed.extracted_text.chars().count(),
                    });
                    excerpts.push(analyzed.extracted_text);
                }
                FileOutcome::Failed { filename, error } => {
                    warn!("Skipping '{}' in consolidated analysis: {}", filename, error);
                }
            }
        }

        let successful = file_info.len();
        if successful == 0 {
            error!("No files could be processed out of {}", total);
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_batch_complete(total, 0);
            }
            return Err(AnalysisError::NoFilesProcessed { total });
        }

        let combined = excerpts.join(DOCUMENT_SEPARATOR);
        let consolidated_analysis = self.llm.analyze_consolidated(&combined, &file_info).await?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, successful);
        }

        Ok(ConsolidatedOutcome {
            total_files: total,
            successful_files: successful,
            failed_files: total - successful,
            file_info,
            consolidated_analysis,
            status: BatchStatus::Success,
        })
    }

    /// Stage → extract → classify → analyse → excerpt.
    async fn run_pipeline(&self, file: &UploadedFile) -> FileOutcome {
        // Removed when `staged` drops, whichever way this function exits.
        let staged = match stage_upload(file).await {
            Ok(s) => s,
            Err(e) => {
                error!("Could not stage '{}': {}", file.filename, e);
                return FileOutcome::failed(&file.filename, format!("Failed to stage upload: {e}"));
            }
        };

        let text = match self.extractor.extract(staged.path(), &file.content).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("No text extracted from '{}'", file.filename);
                return FileOutcome::failed(&file.filename, EMPTY_TEXT_ERROR);
            }
            Err(e) => {
                error!("Extraction failed for '{}': {}", file.filename, e);
                return FileOutcome::failed(&file.filename, e.to_string());
            }
        };
        drop(staged);
        info!("Extracted {} chars from '{}'", text.len(), file.filename);

        let classification = self.llm.classify(&text).await;
        info!(
            "'{}' classified as {}",
            file.filename, classification.document_type
        );
        let analysis = self
            .llm
            .analyze_single(&text, &classification.document_type)
            .await;

        FileOutcome::Success(AnalyzedFile {
            filename: file.filename.clone(),
            document_type: classification.document_type,
            analysis,
            extracted_text: truncate_chars(&text, self.config.excerpt_chars).to_string(),
        })
    }

    /// Batch view of [`Analyzer::process_file`]: validation errors become
    /// failed outcomes too.
    async fn outcome_for(&self, file: UploadedFile) -> FileOutcome {
        match self.process_file(&file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Rejected '{}': {}", file.filename, e);
                let message = e.to_string();
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_error(&file.filename, &message);
                }
                FileOutcome::failed(file.filename, message)
            }
        }
    }

    /// [`Analyzer::outcome_for`] in its own task, awaited immediately.
    async fn isolated_outcome(&self, file: UploadedFile) -> FileOutcome {
        let filename = file.filename.clone();
        let this = self.clone();
        tokio::spawn(async move { this.outcome_for(file).await })
            .await
            .unwrap_or_else(|e| {
                error!("Task for '{}' did not complete: {}", filename, e);
                FileOutcome::failed(filename, format!("Processing task failed: {e}"))
            })
    }
}

/// Resolve the LLM provider.
///
/// 1. A pre-built provider (`config.provider`) is used as-is.
/// 2. Otherwise `ProviderFactory` builds `config.provider_name` with
///    `config.model`, reading the provider's own key variables.
///
/// For OpenAI the key must already be present in the config, so a missing
/// `OPENAI_API_KEY` fails at startup rather than on the first request.
fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, AnalysisError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if config.provider_name.eq_ignore_ascii_case("openai") && config.api_key.is_none() {
        return Err(AnalysisError::ProviderNotConfigured {
            provider: config.provider_name.clone(),
            hint: "Set OPENAI_API_KEY in the environment or a .env file.".to_string(),
        });
    }

    ProviderFactory::create_llm_provider(&config.provider_name, &config.model).map_err(|e| {
        AnalysisError::ProviderNotConfigured {
            provider: config.provider_name.clone(),
            hint: format!("{e}"),
        }
    })
}
