//! Error types for the papertext library.
//!
//! Errors are split by blast radius:
//!
//! * [`InboxError`] — **Fatal**: the run cannot start (missing credentials,
//!   provider not configured, intake directory missing). Returned as
//!   `Err(InboxError)` before any source file is touched.
//!
//! * [`FileError`] — **Per-file**: one PDF failed (conversion rejected,
//!   timed out, output could not be written). Recorded in
//!   [`crate::output::FileReport`]; the batch carries on with the next file.
//!
//! * [`SummaryError`] — **Per-artifact**: one table or figure could not be
//!   summarised. A placeholder is substituted and the document still
//!   completes.
//!
//! * [`ExtractionWarning`] — not an error at all: a malformed artifact
//!   marker that was skipped during extraction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: the whole run is aborted.
#[derive(Debug, Error)]
pub enum InboxError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required credential was not supplied.
    #[error("Missing credential '{name}'.\n{hint}")]
    MissingCredentials { name: String, hint: String },

    /// The configured LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Filesystem layout ─────────────────────────────────────────────────
    /// The intake directory does not exist or cannot be listed.
    #[error("Intake directory '{path}' is not readable: {source}")]
    InboxUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output, summaries, archive or failure directory could not be created.
    #[error("Could not create directory '{path}': {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InboxError {
    /// True for errors caused by configuration rather than by the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            InboxError::MissingCredentials { .. }
                | InboxError::ProviderNotConfigured { .. }
                | InboxError::InvalidConfig(_)
        )
    }
}

/// Errors reported by the conversion service or while waiting on it.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// The service refused the upload.
    #[error("Submission rejected: {detail}")]
    Submit { detail: String },

    /// The service accepted the job and later reported it as failed.
    #[error("Conversion job {job_id} failed on the remote side: {reason}")]
    RemoteFailure { job_id: String, reason: String },

    /// The job did not become ready before the deadline.
    #[error("Conversion job {job_id} not ready after {waited_secs}s")]
    Timeout { job_id: String, waited_secs: u64 },

    /// Network or HTTP-level failure talking to the service.
    #[error("Conversion service unreachable: {detail}")]
    Transport { detail: String },

    /// The service answered with a client error (bad credentials, unknown job).
    #[error("Conversion service rejected the request with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The download is not an archive yet; it can lag the status flag.
    #[error("Conversion result not available yet: {detail}")]
    PayloadNotReady { detail: String },

    /// The downloaded result could not be interpreted.
    #[error("Conversion result is malformed: {detail}")]
    MalformedPayload { detail: String },
}

impl ConversionError {
    /// Transport failures are worth another poll; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConversionError::Transport { .. })
    }
}

/// Raised by the assembler when artifacts and summaries do not line up.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AssemblyError {
    #[error("{artifacts} artifacts but {summaries} summaries")]
    CountMismatch { artifacts: usize, summaries: usize },

    #[error("summary for artifact {found} supplied where artifact {expected} was expected")]
    OutOfOrder { expected: usize, found: usize },

    #[error("artifact {index} span {start}..{end} overlaps the previous artifact ending at {previous_end}")]
    Overlap {
        index: usize,
        start: usize,
        end: usize,
        previous_end: usize,
    },

    #[error("artifact {index} span {start}..{end} is outside the {len}-byte markup")]
    OutOfBounds {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Why one table or figure could not be summarised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SummaryError {
    /// The generation model failed on every attempt.
    #[error("model call failed after {retries} retries: {detail}")]
    ModelFailed { retries: u32, detail: String },

    /// The generation model did not answer in time.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The figure referenced by the markup is not in the conversion bundle.
    #[error("image '{reference}' is not present in the conversion result")]
    MissingImage { reference: String },

    /// The figure is present but not a decodable image.
    #[error("image '{reference}' could not be decoded: {detail}")]
    UnreadableImage { reference: String, detail: String },

    /// The model answered with nothing.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Per-file failure. Never aborts the batch.
#[derive(Debug, Error)]
pub enum FileError {
    /// The source could not be read.
    #[error("Could not read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    /// Another pending source maps to the same output file.
    #[error("'{path}' would overwrite the output of '{other}'")]
    StemCollision { path: PathBuf, other: String },

    /// Output or sidecar could not be written.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source could not be moved into the archive.
    #[error("Failed to archive '{path}': {source}")]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A malformed table or image marker that the extractor skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    /// Byte offset of the offending marker in the markup.
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "byte {}: {}", self.offset, self.message)
    }
}
