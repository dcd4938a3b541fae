//! CLI binary for papertext.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `InboxConfig`, runs one pass over the intake directory and reports.
//!
//! Exit status: 0 when every pending file was archived (or nothing was
//! pending), 1 when some file failed, 2 on a fatal configuration error.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use papertext::{
    ConversionCredentials, DigestReport, DirLayout, FileOutcome, FileReport, FileState, Inbox,
    InboxConfig, InboxProgressCallback, PollPolicy, ProgressCallback, RunReport, RunStatus,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the pending files, one log line
/// per finished file. Files finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Reading inbox…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }
}

impl InboxProgressCallback for CliProgressCallback {
    fn on_run_start(&self, pending: usize, already_archived: usize) {
        self.activate_bar(pending);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("{pending} pending")),
            dim(&format!("({already_archived} already archived)"))
        ));
    }

    fn on_state_change(&self, file_name: &str, state: FileState) {
        if !state.is_terminal() {
            self.bar.set_message(format!("{file_name}: {state}"));
        }
    }

    fn on_file_complete(&self, report: &FileReport) {
        let line = match &report.outcome {
            FileOutcome::Archived {
                artifacts,
                summary_failures,
                ..
            } => {
                let detail = if *summary_failures == 0 {
                    format!("{artifacts} artifacts")
                } else {
                    format!("{artifacts} artifacts, {summary_failures} placeholders")
                };
                format!(
                    "  {} {:<40} {}  {}",
                    green("✓"),
                    report.file_name,
                    dim(&detail),
                    dim(&format!("{}ms", report.duration_ms))
                )
            }
            FileOutcome::ClaimedElsewhere => format!(
                "  {} {:<40} {}",
                cyan("↷"),
                report.file_name,
                dim("claimed by another instance")
            ),
            FileOutcome::Failed { failed_in, error } => format!(
                "  {} {:<40} {} {}",
                red("✗"),
                report.file_name,
                red(&format!("[{failed_in}]")),
                dim(error)
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process ./inbox into ./library, archive sources in ./archive
  papertext

  # Another root directory, failed sources moved aside
  papertext --root ~/papers --failed ~/papers/failed

  # Explicit intake directory and models
  papertext ~/Downloads/pdfs --provider openai --text-model gpt-4.1-mini --vision-model gpt-4.1

  # Keep the LaTeX instead of plain text, then write whole-paper digests
  papertext --raw-latex --digest --digest-focus "sample sizes"

  # Machine-readable report
  papertext --json > report.json

DIRECTORY LAYOUT (under --root, each overridable):
  inbox/       pending PDFs (names starting with _ or . are ignored)
  library/     final plain text, one {stem}.txt per paper
  summaries/   {stem}.artifacts.json per paper, {stem}.txt digests
  archive/     processed PDFs; presence here means "done"

EXIT STATUS:
  0  every pending file archived (or nothing to do)
  1  some files failed
  2  fatal error (missing credentials, provider not configured, bad layout)

ENVIRONMENT VARIABLES:
  MATHPIX_APP_ID            Conversion service app id
  MATHPIX_APP_KEY           Conversion service app key
  OPENAI_API_KEY            OpenAI API key
  ANTHROPIC_API_KEY         Anthropic API key
  GEMINI_API_KEY            Google Gemini API key
  PAPERTEXT_PROVIDER        Provider (openai, anthropic, gemini, ollama)
  PAPERTEXT_TEXT_MODEL      Model for tables and digests
  PAPERTEXT_VISION_MODEL    Model for figures
  A .env file in the working directory is loaded first.
"#;

/// Convert a folder of scientific PDFs into plain text with table and
/// figure descriptions.
#[derive(Parser, Debug)]
#[command(
    name = "papertext",
    version,
    about = "Convert a folder of scientific PDFs into plain text, describing tables and figures in prose",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Intake directory. Default: <ROOT>/inbox.
    #[arg(env = "PAPERTEXT_INBOX")]
    inbox: Option<PathBuf>,

    /// Root of the default directory layout.
    #[arg(long, env = "PAPERTEXT_ROOT", default_value = ".")]
    root: PathBuf,

    /// Directory for final text. Default: <ROOT>/library.
    #[arg(long, env = "PAPERTEXT_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for summary-only artifacts. Default: <ROOT>/summaries.
    #[arg(long, env = "PAPERTEXT_SUMMARIES")]
    summaries: Option<PathBuf>,

    /// Directory for processed sources. Default: <ROOT>/archive.
    #[arg(long, env = "PAPERTEXT_ARCHIVE")]
    archive: Option<PathBuf>,

    /// Move failed sources here instead of leaving them in the inbox.
    #[arg(long, env = "PAPERTEXT_FAILED")]
    failed: Option<PathBuf>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "PAPERTEXT_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Model for table summaries and digests.
    #[arg(long, env = "PAPERTEXT_TEXT_MODEL")]
    text_model: Option<String>,

    /// Multimodal model for figures. Default: the text model.
    #[arg(long, env = "PAPERTEXT_VISION_MODEL")]
    vision_model: Option<String>,

    /// Conversion service endpoint.
    #[arg(long, env = "PAPERTEXT_CONVERSION_URL", default_value = papertext::config::DEFAULT_CONVERSION_ENDPOINT)]
    conversion_url: String,

    /// Conversion service app id.
    #[arg(long, env = "MATHPIX_APP_ID")]
    app_id: Option<String>,

    /// Conversion service app key.
    #[arg(long, env = "MATHPIX_APP_KEY", hide_env_values = true)]
    app_key: Option<String>,

    /// Files processed concurrently.
    #[arg(short, long, env = "PAPERTEXT_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Concurrent model calls per file.
    #[arg(long, env = "PAPERTEXT_SUMMARY_CONCURRENCY", default_value_t = 4)]
    summary_concurrency: usize,

    /// Seconds to wait for one conversion before giving up.
    #[arg(long, env = "PAPERTEXT_POLL_TIMEOUT", default_value_t = 120)]
    poll_timeout: u64,

    /// First poll interval in seconds; doubles after each poll.
    #[arg(long, env = "PAPERTEXT_POLL_INTERVAL", default_value_t = 2.0)]
    poll_interval: f64,

    /// Longest poll interval in seconds.
    #[arg(long, env = "PAPERTEXT_POLL_MAX_INTERVAL", default_value_t = 10.0)]
    poll_max_interval: f64,

    /// Retries per model call.
    #[arg(long, env = "PAPERTEXT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPERTEXT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per model call.
    #[arg(long, env = "PAPERTEXT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Timeout per model call and per HTTP request, in seconds.
    #[arg(long, env = "PAPERTEXT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Keep the assembled LaTeX instead of converting prose to plain text.
    #[arg(long, env = "PAPERTEXT_RAW_LATEX")]
    raw_latex: bool,

    /// After the run, write a whole-paper digest for each undigested text.
    #[arg(long, env = "PAPERTEXT_DIGEST")]
    digest: bool,

    /// Topic the digests should pay particular attention to.
    #[arg(long, env = "PAPERTEXT_DIGEST_FOCUS", requires = "digest")]
    digest_focus: Option<String>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PAPERTEXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPERTEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPERTEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPERTEXT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let code = match run(&cli, show_progress).await {
        Ok(report) => match report.status() {
            RunStatus::AllSucceeded => 0,
            RunStatus::SomeFailed => 1,
        },
        Err(e) => {
            eprintln!("{} {:#}", red("✘"), e);
            2
        }
    };
    std::process::exit(code);
}

async fn run(cli: &Cli, show_progress: bool) -> Result<RunReport> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };

    let config = build_config(cli, progress)?;
    let dirs = config.dirs.clone();
    let inbox = Inbox::from_config(config)?;
    let report = inbox.run().await?;

    let digest = if cli.digest {
        let mut digester = inbox.digester();
        if let Some(ref topic) = cli.digest_focus {
            digester = digester.with_focus(topic.clone());
        }
        match digester.digest_library(&dirs.output, &dirs.summaries).await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Digest pass skipped: {}", e);
                None
            }
        }
    } else {
        None
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "run": &report,
            "digest": &digest,
        }))
        .context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, digest.as_ref());
    }

    Ok(report)
}

fn print_summary(report: &RunReport, digest: Option<&DigestReport>) {
    let archived = report.archived();
    let failed = report.failed();
    eprintln!(
        "{}  {} archived  {} failed  {} already archived  {}",
        if failed == 0 { green("✔") } else { red("✘") },
        bold(&archived.to_string()),
        if failed == 0 {
            failed.to_string()
        } else {
            red(&failed.to_string())
        },
        report.already_archived.len(),
        dim(&format!("{}ms", report.duration_ms)),
    );
    if report.claimed_elsewhere() > 0 {
        eprintln!("   {} claimed by another instance", report.claimed_elsewhere());
    }
    if !report.unfinished.is_empty() {
        eprintln!(
            "   {} archived without output (move back to the inbox to reprocess): {}",
            cyan("⚠"),
            report.unfinished.join(", ")
        );
    }
    if report.summary_failures() > 0 {
        eprintln!(
            "   {} {} artifact summaries replaced by placeholders",
            cyan("⚠"),
            report.summary_failures()
        );
    }
    if let Some(d) = digest {
        eprintln!(
            "   digests: {} written, {} present, {} failed",
            d.written.len(),
            d.skipped,
            d.failed.len()
        );
    }
}

/// Map CLI args to `InboxConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<InboxConfig> {
    let mut dirs = DirLayout::under(&cli.root);
    if let Some(ref p) = cli.inbox {
        dirs.inbox = p.clone();
    }
    if let Some(ref p) = cli.output {
        dirs.output = p.clone();
    }
    if let Some(ref p) = cli.summaries {
        dirs.summaries = p.clone();
    }
    if let Some(ref p) = cli.archive {
        dirs.archive = p.clone();
    }
    if let Some(ref p) = cli.failed {
        dirs = dirs.with_failed(p.clone());
    }

    let poll = PollPolicy {
        initial_interval: Duration::try_from_secs_f64(cli.poll_interval)
            .context("--poll-interval must be a positive number of seconds")?,
        max_interval: Duration::try_from_secs_f64(cli.poll_max_interval)
            .context("--poll-max-interval must be a positive number of seconds")?,
        max_wait: Duration::from_secs(cli.poll_timeout),
        ..PollPolicy::default()
    };

    let mut builder = InboxConfig::builder()
        .dirs(dirs)
        .conversion_endpoint(cli.conversion_url.as_str())
        .poll(poll)
        .concurrency(cli.concurrency)
        .summary_concurrency(cli.summary_concurrency)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .latex_to_text(!cli.raw_latex);

    if cli.app_id.is_some() || cli.app_key.is_some() {
        builder = builder.credentials(ConversionCredentials::new(
            cli.app_id.clone().unwrap_or_default(),
            cli.app_key.clone().unwrap_or_default(),
        ));
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.as_str());
    }
    if let Some(ref model) = cli.text_model {
        builder = builder.text_model(model.as_str());
    }
    if let Some(ref model) = cli.vision_model {
        builder = builder.vision_model(model.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
