//! # papertext
//!
//! Turn a folder of scientific PDFs into a plain-text corpus.
//!
//! ## Why this crate?
//!
//! Retrieval pipelines index text, but the numbers that matter in a paper
//! often live in its tables and figures. A plain OCR pass drops them or
//! turns them into unreadable cell soup. This crate converts each PDF to
//! LaTeX with a hosted OCR service, asks a language model to rewrite every
//! table and figure as prose that keeps all values and relationships, and
//! splices those descriptions back where the artifacts stood.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inbox/paper.pdf
//!  │
//!  ├─ 1. Convert    submit to the OCR service, poll until tex.zip is ready
//!  ├─ 2. Extract    find tabular environments and \includegraphics
//!  ├─ 3. Summarize  text model for tables, vision model for figures
//!  ├─ 4. Assemble   replace each artifact with its summary, in order
//!  ├─ 5. Clean      LaTeX → plain text over the prose
//!  └─ 6. Archive    claim by moving the source, persist library/paper.txt
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use papertext::{ConversionCredentials, DirLayout, Inbox, InboxConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLM provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = InboxConfig::builder()
//!         .dirs(DirLayout::under("papers"))
//!         .credentials(ConversionCredentials::new("my-app-id", "my-app-key"))
//!         .build()?;
//!     let report = Inbox::from_config(config)?.run().await?;
//!     eprintln!("{} archived, {} failed", report.archived(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `papertext` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! papertext = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod digest;
pub mod error;
pub mod inbox;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionCredentials, DirLayout, InboxConfig, InboxConfigBuilder, PollPolicy};
pub use digest::{DigestReport, Digester};
pub use error::{
    AssemblyError, ConversionError, ExtractionWarning, FileError, InboxError, SummaryError,
};
pub use inbox::{Inbox, Scan};
pub use output::{FileLifecycle, FileOutcome, FileReport, FileState, RunReport, RunStatus};
pub use pipeline::assemble::{assemble, FinalTextDocument, Segment};
pub use pipeline::bundle::MarkupBundle;
pub use pipeline::converter::{
    ConversionJob, ConversionService, ConverterClient, JobStatus, MathpixService, PollOutcome,
};
pub use pipeline::extract::{extract, ArtifactKind, ArtifactPayload, EmbeddedArtifact, Extraction};
pub use pipeline::llm::{Generation, GenerationModel, GenerationRequest, ImagePayload, ProviderModel};
pub use pipeline::summarize::{ArtifactSummary, Summarizer, SummaryBatch};
pub use progress::{InboxProgressCallback, NoopProgressCallback, ProgressCallback};
