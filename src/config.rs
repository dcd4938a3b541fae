//! Configuration types for an inbox run.
//!
//! Everything a run needs is carried by [`InboxConfig`], built via
//! [`InboxConfigBuilder`]. Credentials, endpoints and directories are plain
//! fields: no component reads the process environment, so two runs with
//! different credentials can share one process and tests can inject fakes.

use crate::error::InboxError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default Mathpix PDF endpoint (no trailing slash).
pub const DEFAULT_CONVERSION_ENDPOINT: &str = "https://api.mathpix.com/v3/pdf";

/// Default model used for both table and figure summaries.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for one pass over the intake directory.
///
/// # Example
/// ```rust
/// use papertext::{ConversionCredentials, DirLayout, InboxConfig};
///
/// let config = InboxConfig::builder()
///     .dirs(DirLayout::under("/data/papers"))
///     .credentials(ConversionCredentials::new("my-app", "secret"))
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct InboxConfig {
    /// Where sources are picked up and where results land.
    pub dirs: DirLayout,

    /// Conversion service credentials. Required by [`crate::Inbox::from_config`].
    pub credentials: Option<ConversionCredentials>,

    /// Conversion service endpoint. Default: [`DEFAULT_CONVERSION_ENDPOINT`].
    pub conversion_endpoint: String,

    /// Polling schedule while a conversion job is in flight.
    pub poll: PollPolicy,

    /// LLM provider name (e.g. "openai", "anthropic", "azure").
    /// If None, the provider is auto-detected from the environment by the CLI.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Model for table summaries (text-only profile).
    pub text_model: Option<String>,

    /// Model for figure summaries (multimodal profile). Falls back to `text_model`.
    pub vision_model: Option<String>,

    /// Number of source files processed at once. Default: 2.
    pub concurrency: usize,

    /// Number of artifacts of one document summarised at once. Default: 4.
    pub summary_concurrency: usize,

    /// Sampling temperature for summaries. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens per summary. Default: 4096.
    pub max_tokens: usize,

    /// Retries per model call on failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom table prompt. If None, uses [`crate::prompts::TABLE_PROMPT`].
    pub table_prompt: Option<String>,

    /// Custom image prompt. If None, uses [`crate::prompts::IMAGE_PROMPT`].
    pub image_prompt: Option<String>,

    /// Convert LaTeX prose to plain text after assembly. Default: true.
    pub latex_to_text: bool,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            dirs: DirLayout::under("."),
            credentials: None,
            conversion_endpoint: DEFAULT_CONVERSION_ENDPOINT.to_string(),
            poll: PollPolicy::default(),
            provider_name: None,
            provider: None,
            text_model: None,
            vision_model: None,
            concurrency: 2,
            summary_concurrency: 4,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            table_prompt: None,
            image_prompt: None,
            latex_to_text: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for InboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboxConfig")
            .field("dirs", &self.dirs)
            .field("credentials", &self.credentials)
            .field("conversion_endpoint", &self.conversion_endpoint)
            .field("poll", &self.poll)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("concurrency", &self.concurrency)
            .field("summary_concurrency", &self.summary_concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("latex_to_text", &self.latex_to_text)
            .finish()
    }
}

impl InboxConfig {
    /// Create a new builder for `InboxConfig`.
    pub fn builder() -> InboxConfigBuilder {
        InboxConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model name for the text-only profile.
    pub fn text_model_name(&self) -> &str {
        self.text_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Model name for the multimodal profile.
    pub fn vision_model_name(&self) -> &str {
        self.vision_model
            .as_deref()
            .unwrap_or_else(|| self.text_model_name())
    }
}

/// Builder for [`InboxConfig`].
#[derive(Debug)]
pub struct InboxConfigBuilder {
    config: InboxConfig,
}

impl InboxConfigBuilder {
    pub fn dirs(mut self, dirs: DirLayout) -> Self {
        self.config.dirs = dirs;
        self
    }

    pub fn credentials(mut self, credentials: ConversionCredentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn conversion_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.conversion_endpoint = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.config.poll = poll;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn summary_concurrency(mut self, n: usize) -> Self {
        self.config.summary_concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn table_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.table_prompt = Some(prompt.into());
        self
    }

    pub fn image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.image_prompt = Some(prompt.into());
        self
    }

    pub fn latex_to_text(mut self, v: bool) -> Self {
        self.config.latex_to_text = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<InboxConfig, InboxError> {
        let c = &self.config;
        if c.concurrency == 0 || c.summary_concurrency == 0 {
            return Err(InboxError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(InboxError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        c.poll.validate()?;
        c.dirs.validate()?;
        Ok(self.config)
    }
}

// ── Directory layout ─────────────────────────────────────────────────────

/// The directories used as queues.
///
/// `inbox` holds pending PDFs, `output` the final text, `summaries` the
/// summary-only artifacts, `archive` the processed sources. `failed` is
/// optional: when unset, failed sources stay in the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirLayout {
    pub inbox: PathBuf,
    pub output: PathBuf,
    pub summaries: PathBuf,
    pub archive: PathBuf,
    pub failed: Option<PathBuf>,
}

impl DirLayout {
    /// Conventional layout under one root: `inbox/`, `library/`,
    /// `summaries/`, `archive/`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            inbox: root.join("inbox"),
            output: root.join("library"),
            summaries: root.join("summaries"),
            archive: root.join("archive"),
            failed: None,
        }
    }

    /// Set a failure directory.
    pub fn with_failed(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failed = Some(dir.into());
        self
    }

    fn validate(&self) -> Result<(), InboxError> {
        if self.inbox == self.archive {
            return Err(InboxError::InvalidConfig(
                "inbox and archive must be different directories".into(),
            ));
        }
        if self.failed.as_ref() == Some(&self.archive) {
            return Err(InboxError::InvalidConfig(
                "failure and archive directories must differ".into(),
            ));
        }
        Ok(())
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Conversion service credentials (Mathpix `app_id` / `app_key`).
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionCredentials {
    pub app_id: String,
    pub app_key: String,
}

impl ConversionCredentials {
    pub fn new(app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
        }
    }

    /// Both halves present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.app_key.trim().is_empty()
    }
}

impl fmt::Debug for ConversionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionCredentials")
            .field("app_id", &self.app_id)
            .field("app_key", &"<redacted>")
            .finish()
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// Bounded exponential polling schedule for conversion jobs.
///
/// Intervals run `initial_interval`, `× multiplier`, … capped at
/// `max_interval`. The whole wait is capped at `max_wait`; reaching it
/// fails the job with [`crate::error::ConversionError::Timeout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// First wait after submission. Default: 2 s.
    pub initial_interval: Duration,
    /// Upper bound for one wait. Default: 10 s.
    pub max_interval: Duration,
    /// Growth factor between waits. Default: 2.0.
    pub multiplier: f64,
    /// Total time a job may stay not-ready. Default: 120 s.
    pub max_wait: Duration,
    /// Consecutive transport errors tolerated while polling. Default: 3.
    pub max_transport_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_wait: Duration::from_secs(120),
            max_transport_errors: 3,
        }
    }
}

impl PollPolicy {
    /// Wait before poll number `attempt` (0-based).
    pub fn interval(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let secs = self.initial_interval.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
            .unwrap_or(self.max_interval)
    }

    fn validate(&self) -> Result<(), InboxError> {
        if self.initial_interval.is_zero() {
            return Err(InboxError::InvalidConfig(
                "poll interval must be > 0".into(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(InboxError::InvalidConfig(
                "max poll interval must be ≥ the initial interval".into(),
            ));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(InboxError::InvalidConfig(format!(
                "poll multiplier must be ≥ 1, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}
