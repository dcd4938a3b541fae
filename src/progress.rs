//! Progress-callback trait for per-file inbox events.
//!
//! Inject an [`Arc<dyn InboxProgressCallback>`] via
//! [`crate::config::InboxConfigBuilder::progress_callback`] to follow each
//! file through its states as the run progresses.
//!
//! # Example
//!
//! ```rust
//! use papertext::{InboxConfig, InboxProgressCallback, FileReport};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl InboxProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, report: &FileReport) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{} finished ({done} so far)", report.file_name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//!
//! let config = InboxConfig::builder()
//!     .progress_callback(counter as Arc<dyn InboxProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{FileReport, FileState, RunReport};
use std::sync::Arc;

/// Called by the inbox pipeline as it moves files through their states.
///
/// Files are processed concurrently, so every method may be called from
/// several tasks at once. All methods default to no-ops.
pub trait InboxProgressCallback: Send + Sync {
    /// Called once after the intake directory has been scanned.
    ///
    /// # Arguments
    /// * `pending`          — files that will be processed
    /// * `already_archived` — files skipped because the archive has them
    fn on_run_start(&self, pending: usize, already_archived: usize) {
        let _ = (pending, already_archived);
    }

    /// Called on every state transition of a file.
    fn on_state_change(&self, file_name: &str, state: FileState) {
        let _ = (file_name, state);
    }

    /// Called when a file reaches a terminal state.
    fn on_file_complete(&self, report: &FileReport) {
        let _ = report;
    }

    /// Called once after every file has been attempted.
    fn on_run_complete(&self, report: &RunReport) {
        let _ = report;
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl InboxProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::InboxConfig`].
pub type ProgressCallback = Arc<dyn InboxProgressCallback>;
