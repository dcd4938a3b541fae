//! Converter client: submit a PDF to the conversion service and wait for
//! the markup.
//!
//! [`ConversionService`] is the wire-level seam (submit / poll / fetch);
//! [`MathpixService`] implements it over HTTP. [`ConverterClient`] adds the
//! behaviour the pipeline relies on:
//!
//! - submission returns immediately with a [`ConversionJob`];
//! - [`ConverterClient::await_result`] polls on a bounded exponential
//!   schedule ([`crate::config::PollPolicy`]), honouring an optional caller
//!   deadline, and fails with [`ConversionError::Timeout`] when the job is
//!   still not ready — distinct from [`ConversionError::RemoteFailure`];
//! - ready results are cached per job id, so awaiting the same job twice
//!   neither re-downloads nor resubmits.
//!
//! No lock is held across a network call or a sleep.

use crate::config::{ConversionCredentials, PollPolicy};
use crate::error::ConversionError;
use crate::pipeline::bundle::MarkupBundle;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Result of one status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Still processing.
    Pending { percent_done: Option<u8> },
    /// Markup can be fetched.
    Ready,
    /// The service gave up on the document.
    Failed { reason: String },
}

/// Remote document-conversion service.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Upload a PDF; returns the remote job id.
    async fn submit(&self, file_name: &str, pdf: Vec<u8>) -> Result<String, ConversionError>;

    /// Ask for the job's status.
    async fn poll(&self, job_id: &str) -> Result<PollOutcome, ConversionError>;

    /// Download the finished `tex.zip`.
    async fn fetch(&self, job_id: &str) -> Result<Vec<u8>, ConversionError>;
}

/// Status of a [`ConversionJob`] as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Pending { percent_done: Option<u8> },
    Ready,
    Failed { reason: String },
}

/// One in-flight request to the conversion service.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub job_id: String,
    pub status: JobStatus,
    /// Status requests made so far.
    pub polls: u32,
    pub submitted_at: Instant,
}

/// Polling client with a per-job result cache.
pub struct ConverterClient {
    service: Arc<dyn ConversionService>,
    policy: PollPolicy,
    ready: Mutex<HashMap<String, Arc<MarkupBundle>>>,
}

impl ConverterClient {
    pub fn new(service: Arc<dyn ConversionService>, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            ready: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Upload `pdf` (the bytes of `source`) without waiting for conversion.
    pub async fn submit(&self, source: &Path, pdf: Vec<u8>) -> Result<ConversionJob, ConversionError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!("Submitting {}", file_name);
        let job_id = self.service.submit(&file_name, pdf).await?;
        info!("Received job id {} for {}", job_id, file_name);

        Ok(ConversionJob {
            source: source.to_path_buf(),
            job_id,
            status: JobStatus::Submitted,
            polls: 0,
            submitted_at: Instant::now(),
        })
    }

    /// Wait until `job` is ready and return its markup.
    ///
    /// Gives up at whichever comes first: `deadline`, or the policy's
    /// `max_wait` counted from the moment this call starts.
    pub async fn await_result(
        &self,
        job: &mut ConversionJob,
        deadline: Option<Instant>,
    ) -> Result<Arc<MarkupBundle>, ConversionError> {
        if let Some(bundle) = self.cached(&job.job_id) {
            debug!("Job {} already ready, using cached markup", job.job_id);
            job.status = JobStatus::Ready;
            return Ok(bundle);
        }
        if let JobStatus::Failed { reason } = &job.status {
            return Err(ConversionError::RemoteFailure {
                job_id: job.job_id.clone(),
                reason: reason.clone(),
            });
        }

        let started = Instant::now();
        let policy_deadline = instant_after(started, self.policy.max_wait);
        let deadline = deadline.map_or(policy_deadline, |d| d.min(policy_deadline));

        let mut attempt: u32 = 0;
        let mut transport_errors: u32 = 0;

        loop {
            // ── Wait ─────────────────────────────────────────────────────
            let wake = instant_after(Instant::now(), self.policy.interval(attempt));
            if wake >= deadline {
                sleep_until(deadline).await;
            } else {
                sleep_until(wake).await;
            }
            attempt = attempt.saturating_add(1);
            if Instant::now() >= deadline {
                return Err(self.timeout(job, started));
            }

            // ── Poll ─────────────────────────────────────────────────────
            job.polls += 1;
            let Ok(polled) = timeout_at(deadline, self.service.poll(&job.job_id)).await else {
                return Err(self.timeout(job, started));
            };
            let outcome = match polled {
                Ok(outcome) => {
                    transport_errors = 0;
                    outcome
                }
                Err(e) if e.is_transient() => {
                    transport_errors += 1;
                    warn!(
                        "Job {}: status request {} failed ({}/{}) — {}",
                        job.job_id, job.polls, transport_errors, self.policy.max_transport_errors, e
                    );
                    if transport_errors > self.policy.max_transport_errors {
                        return Err(e);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            match outcome {
                PollOutcome::Pending { percent_done } => {
                    debug!("Job {}: pending ({:?}% done)", job.job_id, percent_done);
                    job.status = JobStatus::Pending { percent_done };
                }
                PollOutcome::Failed { reason } => {
                    warn!("Job {}: remote conversion failed — {}", job.job_id, reason);
                    job.status = JobStatus::Failed {
                        reason: reason.clone(),
                    };
                    return Err(ConversionError::RemoteFailure {
                        job_id: job.job_id.clone(),
                        reason,
                    });
                }
                PollOutcome::Ready => match timeout_at(deadline, self.download(&job.job_id)).await {
                    Err(_elapsed) => return Err(self.timeout(job, started)),
                    Ok(Ok(bundle)) => {
                        info!(
                            "Job {}: ready after {} polls ({:.1}s)",
                            job.job_id,
                            job.polls,
                            started.elapsed().as_secs_f64()
                        );
                        job.status = JobStatus::Ready;
                        return Ok(bundle);
                    }
                    // The archive can lag behind the status flag.
                    Ok(Err(ConversionError::PayloadNotReady { detail })) => {
                        debug!("Job {}: result not readable yet — {}", job.job_id, detail);
                        job.status = JobStatus::Pending { percent_done: Some(100) };
                    }
                    Ok(Err(e)) if e.is_transient() => {
                        transport_errors += 1;
                        if transport_errors > self.policy.max_transport_errors {
                            return Err(e);
                        }
                    }
                    Ok(Err(e)) => return Err(e),
                },
            }
        }
    }

    /// Drop the cached markup of a consumed job.
    pub fn release(&self, job: &ConversionJob) {
        if let Ok(mut ready) = self.ready.lock() {
            ready.remove(&job.job_id);
        }
    }

    fn cached(&self, job_id: &str) -> Option<Arc<MarkupBundle>> {
        self.ready.lock().ok()?.get(job_id).cloned()
    }

    async fn download(&self, job_id: &str) -> Result<Arc<MarkupBundle>, ConversionError> {
        let bytes = self.service.fetch(job_id).await?;
        let bundle = Arc::new(MarkupBundle::from_tex_zip(&bytes)?);
        if let Ok(mut ready) = self.ready.lock() {
            ready.insert(job_id.to_string(), Arc::clone(&bundle));
        }
        Ok(bundle)
    }

    fn timeout(&self, job: &ConversionJob, started: Instant) -> ConversionError {
        let waited_secs = started.elapsed().as_secs();
        warn!(
            "Job {}: not ready after {}s ({} polls)",
            job.job_id, waited_secs, job.polls
        );
        ConversionError::Timeout {
            job_id: job.job_id.clone(),
            waited_secs,
        }
    }
}

/// `from + wait`, saturating at a far-future instant instead of overflowing.
fn instant_after(from: Instant, wait: Duration) -> Instant {
    from.checked_add(wait)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ── Mathpix HTTP implementation ──────────────────────────────────────────

/// [`ConversionService`] backed by the Mathpix PDF API.
pub struct MathpixService {
    client: reqwest::Client,
    endpoint: String,
    credentials: ConversionCredentials,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    pdf_id: Option<String>,
    error: Option<serde_json::Value>,
    error_info: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    percent_done: Option<f64>,
    error: Option<serde_json::Value>,
}

impl MathpixService {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: ConversionCredentials,
        request_timeout_secs: u64,
    ) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| ConversionError::Transport {
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Options sent with every upload: only the `tex.zip` format.
    fn options_json() -> String {
        serde_json::json!({
            "conversion_formats": {
                "md": false,
                "docx": false,
                "tex.zip": true,
                "html": false
            }
        })
        .to_string()
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("app_id", &self.credentials.app_id)
            .header("app_key", &self.credentials.app_key)
    }
}

fn transport(e: reqwest::Error) -> ConversionError {
    ConversionError::Transport {
        detail: e.to_string(),
    }
}

#[async_trait]
impl ConversionService for MathpixService {
    async fn submit(&self, file_name: &str, pdf: Vec<u8>) -> Result<String, ConversionError> {
        let part = reqwest::multipart::Part::bytes(pdf)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(transport)?;
        let form = reqwest::multipart::Form::new()
            .text("options_json", Self::options_json())
            .part("file", part);

        let resp = self
            .authed(self.client.post(&self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConversionError::Submit {
                detail: format!("HTTP {status}: {body}"),
            });
        }

        let body: SubmitResponse = resp.json().await.map_err(|e| ConversionError::Submit {
            detail: format!("unexpected response: {e}"),
        })?;
        if let Some(error) = body.error {
            return Err(ConversionError::Submit {
                detail: match body.error_info {
                    Some(info) => format!("{error} ({info})"),
                    None => error.to_string(),
                },
            });
        }
        body.pdf_id.ok_or_else(|| ConversionError::Submit {
            detail: "response carries no pdf_id".into(),
        })
    }

    async fn poll(&self, job_id: &str) -> Result<PollOutcome, ConversionError> {
        let url = format!("{}/{}", self.endpoint, job_id);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), &url));
        }
        let body: StatusResponse = resp.json().await.map_err(transport)?;
        Ok(parse_status(body))
    }

    async fn fetch(&self, job_id: &str) -> Result<Vec<u8>, ConversionError> {
        let url = format!("{}/{}.tex", self.endpoint, job_id);
        info!("Downloading {}", url);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), &url));
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Client errors are final, except timeouts and rate limiting; server
/// errors are worth another poll.
fn status_error(status: reqwest::StatusCode, url: &str) -> ConversionError {
    let retryable = matches!(
        status,
        reqwest::StatusCode::REQUEST_TIMEOUT | reqwest::StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !retryable {
        ConversionError::Rejected {
            status: status.as_u16(),
            detail: format!("GET {url}"),
        }
    } else {
        ConversionError::Transport {
            detail: format!("HTTP {status} from {url}"),
        }
    }
}

fn parse_status(body: StatusResponse) -> PollOutcome {
    match body.status.as_str() {
        "completed" => PollOutcome::Ready,
        "error" => PollOutcome::Failed {
            reason: body
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "processing error reported by the service".into()),
        },
        _ => PollOutcome::Pending {
            percent_done: body.percent_done.map(|p| p.clamp(0.0, 100.0) as u8),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bundle::tests::tex_zip;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Scripted service: returns `script` outcomes in order, then repeats the last.
    struct ScriptedService {
        script: Vec<Result<PollOutcome, ConversionError>>,
        polls: AtomicU32,
        submits: AtomicU32,
        fetches: AtomicU32,
        payload: Vec<u8>,
        /// Time each status request takes.
        poll_delay: Duration,
        /// Time each download takes.
        fetch_delay: Duration,
    }

    impl ScriptedService {
        fn new(script: Vec<Result<PollOutcome, ConversionError>>) -> Self {
            Self {
                script,
                polls: AtomicU32::new(0),
                submits: AtomicU32::new(0),
                fetches: AtomicU32::new(0),
                payload: tex_zip("Body text.", &[]),
                poll_delay: Duration::ZERO,
                fetch_delay: Duration::ZERO,
            }
        }

        fn with_payload(mut self, payload: Vec<u8>) -> Self {
            self.payload = payload;
            self
        }
    }

    #[async_trait]
    impl ConversionService for ScriptedService {
        async fn submit(&self, _file_name: &str, _pdf: Vec<u8>) -> Result<String, ConversionError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok("job-1".into())
        }

        async fn poll(&self, _job_id: &str) -> Result<PollOutcome, ConversionError> {
            tokio::time::sleep(self.poll_delay).await;
            let n = self.polls.fetch_add(1, Ordering::SeqCst) as usize;
            let idx = n.min(self.script.len() - 1);
            self.script[idx].clone()
        }

        async fn fetch(&self, _job_id: &str) -> Result<Vec<u8>, ConversionError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.fetch_delay).await;
            Ok(self.payload.clone())
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            multiplier: 2.0,
            max_wait: Duration::from_secs(30),
            max_transport_errors: 2,
        }
    }

    fn pending() -> Result<PollOutcome, ConversionError> {
        Ok(PollOutcome::Pending { percent_done: Some(10) })
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_pending_polls() {
        let svc = Arc::new(ScriptedService::new(vec![pending(), pending(), Ok(PollOutcome::Ready)]));
        let client = ConverterClient::new(svc.clone(), policy());
        let mut job = client.submit(Path::new("inbox/paper.pdf"), b"%PDF".to_vec()).await.unwrap();
        assert_eq!(job.status, JobStatus::Submitted);

        let started = Instant::now();
        let bundle = client.await_result(&mut job, None).await.unwrap();
        assert_eq!(bundle.markup, "Body text.");
        assert_eq!(job.status, JobStatus::Ready);
        assert_eq!(job.polls, 3);
        // 1s + 2s + 4s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_job_is_served_from_cache() {
        let svc = Arc::new(ScriptedService::new(vec![Ok(PollOutcome::Ready)]));
        let client = ConverterClient::new(svc.clone(), policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let first = client.await_result(&mut job, None).await.unwrap();
        let second = client.await_result(&mut job, None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(svc.submits.load(Ordering::SeqCst), 1);
        assert_eq!(svc.polls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.fetches.load(Ordering::SeqCst), 1);

        client.release(&job);
        assert!(client.cached(&job.job_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out() {
        let svc = Arc::new(ScriptedService::new(vec![pending()]));
        let client = ConverterClient::new(svc, policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let err = client.await_result(&mut job, None).await.unwrap_err();
        match err {
            ConversionError::Timeout { waited_secs, .. } => assert_eq!(waited_secs, 30),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_cuts_the_wait_short() {
        let svc = Arc::new(ScriptedService::new(vec![pending()]));
        let client = ConverterClient::new(svc, policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = client.await_result(&mut job, Some(deadline)).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { waited_secs: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_is_not_a_timeout() {
        let svc = Arc::new(ScriptedService::new(vec![
            pending(),
            Ok(PollOutcome::Failed { reason: "bad scan".into() }),
        ]));
        let client = ConverterClient::new(svc, policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let err = client.await_result(&mut job, None).await.unwrap_err();
        assert!(matches!(err, ConversionError::RemoteFailure { ref reason, .. } if reason == "bad scan"));
        assert!(matches!(job.status, JobStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_tolerated_up_to_the_limit() {
        let flaky = || Err(ConversionError::Transport { detail: "reset".into() });
        let svc = Arc::new(ScriptedService::new(vec![flaky(), flaky(), Ok(PollOutcome::Ready)]));
        let client = ConverterClient::new(svc, policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();
        tokio_test::assert_ok!(client.await_result(&mut job, None).await);

        let svc = Arc::new(ScriptedService::new(vec![flaky()]));
        let client = ConverterClient::new(svc, policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();
        let err = client.await_result(&mut job, None).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_status_request_is_cut_at_the_deadline() {
        let svc = ScriptedService {
            poll_delay: Duration::from_secs(60),
            ..ScriptedService::new(vec![Ok(PollOutcome::Ready)])
        };
        let client = ConverterClient::new(Arc::new(svc), policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let started = Instant::now();
        let deadline = started + Duration::from_secs(5);
        let err = client.await_result(&mut job, Some(deadline)).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { waited_secs: 5, .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_download_is_cut_at_the_deadline() {
        let svc = ScriptedService {
            fetch_delay: Duration::from_secs(600),
            ..ScriptedService::new(vec![Ok(PollOutcome::Ready)])
        };
        let client = ConverterClient::new(Arc::new(svc), policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let started = Instant::now();
        let err = client.await_result(&mut job, None).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { waited_secs: 30, .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert!(client.cached(&job.job_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn archive_without_tex_fails_at_once() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zw = zip::ZipWriter::new(&mut buf);
            zw.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
            zw.write_all(b"nothing").unwrap();
            zw.finish().unwrap();
        }
        let svc = Arc::new(
            ScriptedService::new(vec![Ok(PollOutcome::Ready)]).with_payload(buf.into_inner()),
        );
        let client = ConverterClient::new(svc.clone(), policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let started = Instant::now();
        let err = client.await_result(&mut job, None).await.unwrap_err();
        assert!(matches!(err, ConversionError::MalformedPayload { .. }), "{err:?}");
        assert_eq!(svc.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn payload_that_is_not_an_archive_yet_is_polled_again() {
        let svc = Arc::new(
            ScriptedService::new(vec![Ok(PollOutcome::Ready)])
                .with_payload(br#"{"status":"processing"}"#.to_vec()),
        );
        let client = ConverterClient::new(svc.clone(), policy());
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();

        let err = client.await_result(&mut job, None).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { .. }), "{err:?}");
        assert!(svc.fetches.load(Ordering::SeqCst) > 1);
        assert_eq!(job.status, JobStatus::Pending { percent_done: Some(100) });
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_wait_does_not_overflow() {
        let svc = Arc::new(ScriptedService::new(vec![pending(), Ok(PollOutcome::Ready)]));
        let policy = PollPolicy {
            max_interval: Duration::MAX,
            max_wait: Duration::from_secs(u64::MAX),
            ..policy()
        };
        let client = ConverterClient::new(svc, policy);
        let mut job = client.submit(Path::new("a.pdf"), vec![]).await.unwrap();
        tokio_test::assert_ok!(client.await_result(&mut job, None).await);
    }

    #[test]
    fn far_future_saturates() {
        let now = Instant::now();
        assert!(instant_after(now, Duration::MAX) > now + Duration::from_secs(86_400 * 365));
        assert_eq!(instant_after(now, Duration::from_secs(3)), now + Duration::from_secs(3));
    }

    #[test]
    fn client_errors_are_not_retried() {
        use reqwest::StatusCode;
        let url = "https://api.example/v3/pdf/job";

        let e = status_error(StatusCode::UNAUTHORIZED, url);
        assert!(matches!(e, ConversionError::Rejected { status: 401, .. }));
        assert!(!e.is_transient());
        assert!(!status_error(StatusCode::NOT_FOUND, url).is_transient());

        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, url).is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY, url).is_transient());
    }

    #[test]
    fn status_parsing() {
        let ready = parse_status(StatusResponse {
            status: "completed".into(),
            percent_done: Some(100.0),
            error: None,
        });
        assert_eq!(ready, PollOutcome::Ready);

        let pending = parse_status(StatusResponse {
            status: "split".into(),
            percent_done: Some(42.7),
            error: None,
        });
        assert_eq!(pending, PollOutcome::Pending { percent_done: Some(42) });

        let failed = parse_status(StatusResponse {
            status: "error".into(),
            percent_done: None,
            error: None,
        });
        assert!(matches!(failed, PollOutcome::Failed { .. }));
    }

    #[test]
    fn options_request_only_tex_zip() {
        let v: serde_json::Value = serde_json::from_str(&MathpixService::options_json()).unwrap();
        assert_eq!(v["conversion_formats"]["tex.zip"], true);
        assert_eq!(v["conversion_formats"]["md"], false);
    }
}
