//! Progress-callback trait for per-file analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each upload. The trait is
//! `Send + Sync` because independent-mode batches run each file on its own
//! `tokio::spawn`ed task.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docanalyze::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, filename: &str, document_type: &str) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {filename} is a {document_type}");
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. In independent mode `on_file_*` may be called
/// concurrently from different threads.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before any file of a batch is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called after the upload was validated, before extraction starts.
    fn on_file_start(&self, filename: &str) {
        let _ = filename;
    }

    /// Called when a file was classified and analysed.
    fn on_file_complete(&self, filename: &str, document_type: &str) {
        let _ = (filename, document_type);
    }

    /// Called when a file ends in a failed outcome.
    fn on_file_error(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }

    /// Called once when a batch finishes: after every file was attempted
    /// and, in consolidated mode, after the cross-document analysis.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A callback that ignores every event.
///
/// Not installed implicitly: an unset callback is stored as `None` in
/// [`crate::config::AnalysisConfig`].
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
