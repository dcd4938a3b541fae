//! Inbox pipeline: drive every pending PDF through conversion,
//! extraction, summarisation and assembly, then archive it.
//!
//! ## Filesystem as queue
//!
//! The intake directory is the queue and the archive directory is the
//! record of what is done. Nothing else is remembered between runs, so a
//! crashed run is resumed by simply running again: a file whose name is
//! already in the archive is never reprocessed.
//!
//! ## Claiming
//!
//! Several pipeline instances may share one inbox. Moving the source into
//! the archive is the claim: output is first written to temp files next to
//! its destination, then the source is renamed into the archive, and only
//! then are the temp files persisted. If the rename fails because the
//! source is gone, another instance got there first and our temp files
//! are discarded. Rename is atomic only within one filesystem, so the
//! inbox and archive must share one.
//!
//! A crash between the claim and the persist leaves a source in the
//! archive with no output. [`Inbox::scan`] reports such entries as
//! [`Scan::unfinished`]; moving one back to the inbox reprocesses it.
//!
//! ## Output names
//!
//! The output is `{stem}.txt`, so two sources may map to one output
//! (`paper.pdf` and `paper.PDF`). A source whose output name is taken by
//! an earlier pending source, or by an existing library file, fails
//! without being converted.

use crate::config::{ConversionCredentials, InboxConfig};
use crate::digest::Digester;
use crate::error::{ExtractionWarning, FileError, InboxError};
use crate::output::{FileLifecycle, FileOutcome, FileReport, FileState, RunReport};
use crate::pipeline::assemble::assemble;
use crate::pipeline::converter::{ConversionService, ConverterClient, MathpixService};
use crate::pipeline::extract::{extract, EmbeddedArtifact};
use crate::pipeline::llm::{CallPolicy, GenerationModel, ProviderModel};
use crate::pipeline::postprocess::{ensure_final_newline, latex_to_text};
use crate::pipeline::summarize::{ArtifactSummary, Summarizer, SummaryPrompts};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{IMAGE_PROMPT, TABLE_PROMPT};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, error, info, warn};

/// Intake directory contents at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Sources to process, sorted by name.
    pub pending: Vec<PathBuf>,
    /// Intake files whose name is already in the archive.
    pub already_archived: Vec<String>,
    /// Sources whose output name is already taken, with the name that
    /// holds it.
    pub collisions: Vec<(PathBuf, String)>,
    /// Archive entries whose output is missing from the library.
    pub unfinished: Vec<String>,
}

/// The ingestion pipeline over one directory layout.
pub struct Inbox {
    config: InboxConfig,
    converter: ConverterClient,
    summarizer: Summarizer,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("config", &self.config)
            .field("summarizer", &self.summarizer)
            .finish()
    }
}

/// Outcome of the claim step.
enum Claim {
    Claimed,
    Elsewhere,
}

impl Inbox {
    /// Build the pipeline with the Mathpix service and `edgequake_llm`
    /// providers described by `config`.
    ///
    /// Fails before touching any file when credentials are missing or no
    /// provider can be initialised.
    pub fn from_config(config: InboxConfig) -> Result<Self, InboxError> {
        let credentials = config
            .credentials
            .clone()
            .filter(ConversionCredentials::is_complete)
            .ok_or_else(|| InboxError::MissingCredentials {
                name: "MATHPIX_APP_ID / MATHPIX_APP_KEY".into(),
                hint: "Pass --app-id and --app-key, or set MATHPIX_APP_ID and MATHPIX_APP_KEY.".into(),
            })?;

        let service = MathpixService::new(
            config.conversion_endpoint.clone(),
            credentials,
            config.api_timeout_secs,
        )
        .map_err(|e| InboxError::Internal(format!("HTTP client: {e}")))?;

        let (text_model, vision_model) = resolve_models(&config)?;
        Ok(Self::with_services(config, Arc::new(service), text_model, vision_model))
    }

    /// Build the pipeline over explicit collaborators.
    pub fn with_services(
        config: InboxConfig,
        service: Arc<dyn ConversionService>,
        text_model: Arc<dyn GenerationModel>,
        vision_model: Arc<dyn GenerationModel>,
    ) -> Self {
        let prompts = SummaryPrompts {
            table: config.table_prompt.clone().unwrap_or_else(|| TABLE_PROMPT.to_string()),
            image: config.image_prompt.clone().unwrap_or_else(|| IMAGE_PROMPT.to_string()),
        };
        let summarizer = Summarizer::new(text_model, vision_model)
            .with_prompts(prompts)
            .with_concurrency(config.summary_concurrency);
        let converter = ConverterClient::new(service, config.poll.clone());
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        Self {
            config,
            converter,
            summarizer,
            progress,
        }
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    /// Digest pass over this inbox's library with the text model.
    pub fn digester(&self) -> Digester {
        Digester::new(self.summarizer.text_model()).with_concurrency(self.config.concurrency)
    }

    /// Create the output, summaries, archive and failure directories.
    pub async fn prepare_dirs(&self) -> Result<(), InboxError> {
        let dirs = &self.config.dirs;
        let mut targets = vec![&dirs.output, &dirs.summaries, &dirs.archive];
        targets.extend(dirs.failed.as_ref());
        for dir in targets {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| InboxError::DirectoryUnavailable {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// List pending sources.
    ///
    /// Only `*.pdf` regular files count; names starting with `_` or `.`
    /// are ignored. Presence in the archive is checked on disk. Sources
    /// whose output name is taken go to [`Scan::collisions`] instead of
    /// `pending`.
    pub async fn scan(&self) -> Result<Scan, InboxError> {
        let inbox = &self.config.dirs.inbox;
        let unreadable = |source| InboxError::InboxUnreadable {
            path: inbox.clone(),
            source,
        };

        let mut entries = ReadDirStream::new(tokio::fs::read_dir(inbox).await.map_err(unreadable)?);
        let mut scan = Scan::default();

        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(unreadable)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_candidate(&name) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            let archived = self.config.dirs.archive.join(&name);
            if tokio::fs::try_exists(&archived).await.unwrap_or(false) {
                debug!("{} is already archived, skipping", name);
                scan.already_archived.push(name);
            } else {
                scan.pending.push(entry.path());
            }
        }

        scan.pending.sort();
        scan.already_archived.sort();

        let mut owners: HashMap<String, String> = HashMap::new();
        let mut pending = Vec::with_capacity(scan.pending.len());
        for path in std::mem::take(&mut scan.pending) {
            let name = file_name_of(&path);
            let output_name = format!("{}.txt", stem(&name));
            let mut owner = owners.get(&output_name).cloned();
            if owner.is_none()
                && tokio::fs::try_exists(self.config.dirs.output.join(&output_name))
                    .await
                    .unwrap_or(false)
            {
                owner = Some(output_name.clone());
            }
            match owner {
                Some(other) => {
                    warn!("{} would overwrite the output of {}, skipping", name, other);
                    scan.collisions.push((path, other));
                }
                None => {
                    owners.insert(output_name, name);
                    pending.push(path);
                }
            }
        }
        scan.pending = pending;

        scan.unfinished = self.unfinished().await;
        Ok(scan)
    }

    /// Archive entries with no `{stem}.txt` in the library. An unreadable
    /// or missing archive has none.
    async fn unfinished(&self) -> Vec<String> {
        let dirs = &self.config.dirs;
        let Ok(read_dir) = tokio::fs::read_dir(&dirs.archive).await else {
            return Vec::new();
        };
        let mut entries = ReadDirStream::new(read_dir);
        let mut unfinished = Vec::new();
        while let Some(Ok(entry)) = entries.next().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_candidate(&name) {
                continue;
            }
            let output = dirs.output.join(format!("{}.txt", stem(&name)));
            if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
                warn!(
                    "{} is archived but {} is missing; move it back to the inbox to reprocess",
                    name,
                    output.display()
                );
                unfinished.push(name);
            }
        }
        unfinished.sort();
        unfinished
    }

    /// Process every pending source; per-file failures are isolated in the
    /// report, only layout problems abort the run.
    pub async fn run(&self) -> Result<RunReport, InboxError> {
        let start = Instant::now();
        self.prepare_dirs().await?;
        let scan = self.scan().await?;

        info!(
            "{} pending, {} already archived, {} output collisions (concurrency {})",
            scan.pending.len(),
            scan.already_archived.len(),
            scan.collisions.len(),
            self.config.concurrency
        );
        self.progress.on_run_start(
            scan.pending.len() + scan.collisions.len(),
            scan.already_archived.len(),
        );

        let mut files: Vec<(usize, FileReport)> = stream::iter(scan.pending.iter().enumerate())
            .map(|(i, path)| async move { (i, self.process_file(path).await) })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        files.sort_by_key(|(i, _)| *i);

        let mut files: Vec<FileReport> = files.into_iter().map(|(_, r)| r).collect();
        for (path, other) in &scan.collisions {
            files.push(self.reject_collision(path, other).await);
        }

        let report = RunReport {
            files,
            already_archived: scan.already_archived,
            unfinished: scan.unfinished,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Run complete: {} archived, {} failed, {} already archived, {} summary failures",
            report.archived(),
            report.failed(),
            report.already_archived.len(),
            report.summary_failures()
        );
        self.progress.on_run_complete(&report);
        Ok(report)
    }

    /// Take one source from `Pending` to `Archived` or `Failed`.
    pub async fn process_file(&self, path: &Path) -> FileReport {
        let start = Instant::now();
        let file_name = file_name_of(path);
        let mut lifecycle = FileLifecycle::default();
        let result = self.drive(path, &file_name, &mut lifecycle).await;
        self.finish(path, file_name, lifecycle, result, start).await
    }

    /// Fail a source whose output name is taken, before any conversion.
    async fn reject_collision(&self, path: &Path, other: &str) -> FileReport {
        let start = Instant::now();
        let result = Err(FileError::StemCollision {
            path: path.to_path_buf(),
            other: other.to_string(),
        });
        self.finish(path, file_name_of(path), FileLifecycle::default(), result, start)
            .await
    }

    async fn finish(
        &self,
        path: &Path,
        file_name: String,
        mut lifecycle: FileLifecycle,
        result: Result<FileOutcome, FileError>,
        start: Instant,
    ) -> FileReport {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let failed_in = lifecycle.current();
                error!(file = %file_name, state = %failed_in, "Failed: {}", e);
                if lifecycle.advance(FileState::Failed).is_ok() {
                    self.progress.on_state_change(&file_name, FileState::Failed);
                }
                self.quarantine(path, &file_name).await;
                FileOutcome::Failed {
                    failed_in,
                    error: e.to_string(),
                }
            }
        };

        let report = FileReport {
            file_name,
            history: lifecycle.into_history(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.progress.on_file_complete(&report);
        report
    }

    async fn drive(
        &self,
        path: &Path,
        file_name: &str,
        lifecycle: &mut FileLifecycle,
    ) -> Result<FileOutcome, FileError> {
        // ── Converting ────────────────────────────────────────────────────
        self.advance(lifecycle, file_name, FileState::Converting)?;
        let pdf = read_pdf(path).await?;
        let mut job = self.converter.submit(path, pdf).await?;
        let bundle = self.converter.await_result(&mut job, None).await?;
        self.converter.release(&job);

        // ── Extracting ────────────────────────────────────────────────────
        self.advance(lifecycle, file_name, FileState::Extracting)?;
        let extraction = extract(&bundle.markup);
        for w in &extraction.warnings {
            warn!(file = %file_name, "Extraction: {}", w);
        }
        info!(
            file = %file_name,
            "{} artifacts, {} warnings",
            extraction.artifacts.len(),
            extraction.warnings.len()
        );

        // ── Summarizing ───────────────────────────────────────────────────
        self.advance(lifecycle, file_name, FileState::Summarizing)?;
        let batch = self
            .summarizer
            .summarize_all(&extraction.artifacts, &bundle)
            .await;
        let (tokens_in, tokens_out) = batch.total_tokens();
        debug!(
            file = %file_name,
            "Summaries: {} failed, {} input tokens, {} output tokens",
            batch.failures, tokens_in, tokens_out
        );

        // ── Assembling ────────────────────────────────────────────────────
        self.advance(lifecycle, file_name, FileState::Assembling)?;
        let document = assemble(&bundle.markup, &extraction.artifacts, &batch.summaries)?;
        let text = if self.config.latex_to_text {
            ensure_final_newline(&document.map_prose(latex_to_text).text())
        } else {
            document.text()
        };
        let sidecar = serde_json::to_vec_pretty(&ArtifactSidecar {
            source: file_name,
            tex_name: &bundle.tex_name,
            artifacts: extraction
                .artifacts
                .iter()
                .zip(&batch.summaries)
                .map(|(artifact, summary)| SidecarEntry { artifact, summary })
                .collect(),
            warnings: &extraction.warnings,
        })
        .map_err(|e| FileError::Internal(format!("sidecar: {e}")))?;

        let output = self.config.dirs.output.join(format!("{}.txt", stem(file_name)));
        let claim = self.claim_and_persist(path, file_name, &output, text, sidecar).await?;
        self.advance(lifecycle, file_name, FileState::Archived)?;

        Ok(match claim {
            Claim::Claimed => {
                info!(file = %file_name, "Archived → {}", output.display());
                FileOutcome::Archived {
                    output,
                    artifacts: extraction.artifacts.len(),
                    summary_failures: batch.failures,
                    warnings: extraction.warnings.iter().map(|w| w.to_string()).collect(),
                }
            }
            Claim::Elsewhere => {
                info!(file = %file_name, "Archived by another instance, output discarded");
                FileOutcome::ClaimedElsewhere
            }
        })
    }

    fn advance(&self, lifecycle: &mut FileLifecycle, file_name: &str, to: FileState) -> Result<(), FileError> {
        lifecycle
            .advance(to)
            .map_err(|e| FileError::Internal(e.to_string()))?;
        debug!(file = %file_name, "→ {}", to);
        self.progress.on_state_change(file_name, to);
        Ok(())
    }

    async fn claim_and_persist(
        &self,
        source: &Path,
        file_name: &str,
        output: &Path,
        text: String,
        sidecar: Vec<u8>,
    ) -> Result<Claim, FileError> {
        let dirs = &self.config.dirs;
        let plan = PersistPlan {
            source: source.to_path_buf(),
            archived: dirs.archive.join(file_name),
            output: output.to_path_buf(),
            text,
            sidecar_path: dirs.summaries.join(format!("{}.artifacts.json", stem(file_name))),
            sidecar,
        };
        tokio::task::spawn_blocking(move || plan.execute())
            .await
            .map_err(|e| FileError::Internal(format!("persist task: {e}")))?
    }

    /// Move a failed source to the failure directory, if one is configured.
    async fn quarantine(&self, path: &Path, file_name: &str) {
        let Some(failed_dir) = &self.config.dirs.failed else {
            return;
        };
        let target = failed_dir.join(file_name);
        match tokio::fs::rename(path, &target).await {
            Ok(()) => info!(file = %file_name, "Moved to {}", target.display()),
            Err(e) => warn!(file = %file_name, "Could not move to {}: {}", target.display(), e),
        }
    }
}

// ── Persistence ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SidecarEntry<'a> {
    artifact: &'a EmbeddedArtifact,
    summary: &'a ArtifactSummary,
}

/// `{summaries}/{stem}.artifacts.json`
#[derive(Serialize)]
struct ArtifactSidecar<'a> {
    source: &'a str,
    tex_name: &'a str,
    artifacts: Vec<SidecarEntry<'a>>,
    warnings: &'a [ExtractionWarning],
}

struct PersistPlan {
    source: PathBuf,
    archived: PathBuf,
    output: PathBuf,
    text: String,
    sidecar_path: PathBuf,
    sidecar: Vec<u8>,
}

impl PersistPlan {
    /// Temp files → archive re-check → claim by rename → persist.
    /// Dropping an unpersisted `NamedTempFile` deletes it.
    fn execute(self) -> Result<Claim, FileError> {
        let text_tmp = write_temp(&self.output, self.text.as_bytes())?;
        let sidecar_tmp = write_temp(&self.sidecar_path, &self.sidecar)?;

        if self.archived.exists() {
            return Ok(Claim::Elsewhere);
        }
        if let Err(e) = std::fs::rename(&self.source, &self.archived) {
            if !self.source.exists() {
                return Ok(Claim::Elsewhere);
            }
            return Err(FileError::ArchiveFailed {
                path: self.source,
                source: e,
            });
        }

        let persisted = text_tmp
            .persist(&self.output)
            .map_err(|e| (self.output.clone(), e.error))
            .and_then(|_| {
                sidecar_tmp
                    .persist(&self.sidecar_path)
                    .map_err(|e| (self.sidecar_path.clone(), e.error))
            });

        if let Err((path, source)) = persisted {
            if let Err(e) = std::fs::remove_file(&self.output) {
                debug!("No output to remove at {}: {}", self.output.display(), e);
            }
            if let Err(e) = std::fs::rename(&self.archived, &self.source) {
                error!(
                    "Could not return {} to the inbox: {}",
                    self.archived.display(),
                    e
                );
            }
            return Err(FileError::OutputWriteFailed { path, source });
        }
        Ok(Claim::Claimed)
    }
}

fn write_temp(target: &Path, bytes: &[u8]) -> Result<NamedTempFile, FileError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let failed = |source| FileError::OutputWriteFailed {
        path: target.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(bytes).map_err(failed)?;
    tmp.flush().map_err(failed)?;
    Ok(tmp)
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// `*.pdf` (any case), not hidden, not `_`-prefixed.
fn is_candidate(name: &str) -> bool {
    !name.starts_with('_')
        && !name.starts_with('.')
        && Path::new(name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// Read the source and check the `%PDF` magic bytes.
async fn read_pdf(path: &Path) -> Result<Vec<u8>, FileError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(FileError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(bytes)
}

/// Resolve the text-only and multimodal models, most specific first:
///
/// 1. **Pre-built provider** (`config.provider`), used for both profiles.
/// 2. **Named provider** (`config.provider_name`) with the configured text
///    and vision model names, via [`ProviderFactory::create_llm_provider`].
/// 3. **Auto-detection** ([`ProviderFactory::from_env`]).
fn resolve_models(
    config: &InboxConfig,
) -> Result<(Arc<dyn GenerationModel>, Arc<dyn GenerationModel>), InboxError> {
    let policy = CallPolicy::from_config(config);
    let text_name = config.text_model_name();
    let vision_name = config.vision_model_name();

    let model = |provider: Arc<dyn LLMProvider>, label: String| -> Arc<dyn GenerationModel> {
        Arc::new(ProviderModel::new(provider, label, policy))
    };

    if let Some(ref provider) = config.provider {
        let m = model(Arc::clone(provider), "custom".into());
        return Ok((Arc::clone(&m), m));
    }

    if let Some(ref name) = config.provider_name {
        let text = model(create_provider(name, text_name)?, format!("{name}/{text_name}"));
        let vision = if vision_name == text_name {
            Arc::clone(&text)
        } else {
            model(create_provider(name, vision_name)?, format!("{name}/{vision_name}"))
        };
        return Ok((text, vision));
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| InboxError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
            Error: {}",
            e
        ),
    })?;
    let m = model(llm, "auto".into());
    Ok((Arc::clone(&m), m))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InboxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InboxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
