//! Generation model seam: one prompt (plus an optional image) in, text out.
//!
//! [`GenerationModel`] is what the summariser talks to. [`ProviderModel`]
//! implements it on top of an `edgequake_llm` provider, adding the
//! per-call timeout and the retry loop.
//!
//! ## Retry Strategy
//!
//! Provider errors (429 / 503 under concurrent load) are retried with
//! exponential backoff `retry_backoff_ms * 2^(attempt-1)`: with 500 ms
//! base and 3 retries the waits are 500 ms → 1 s → 2 s. A timed-out call
//! counts as a failed attempt.

use crate::config::InboxConfig;
use crate::error::SummaryError;
use crate::pipeline::encode::encode_image;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Image attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<ImagePayload>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(ImagePayload {
                data,
                mime_type: mime_type.into(),
            }),
        }
    }
}

/// Model answer with token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Text (or text + image) generation.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Human-readable model name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SummaryError>;
}

/// Retry and timeout settings for [`ProviderModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &InboxConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// [`GenerationModel`] backed by an `edgequake_llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    policy: CallPolicy,
}

impl ProviderModel {
    /// `label` names the model in logs, e.g. `openai/gpt-4.1-mini`.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, policy: CallPolicy) -> Self {
        Self {
            provider,
            label: label.into(),
            policy,
        }
    }
}

impl std::fmt::Debug for ProviderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderModel")
            .field("label", &self.label)
            .field("policy", &self.policy)
            .finish()
    }
}

fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    match &request.image {
        Some(img) => vec![ChatMessage::user_with_images(
            request.prompt.as_str(),
            vec![encode_image(&img.data, &img.mime_type)],
        )],
        None => vec![ChatMessage::user(request.prompt.as_str())],
    }
}

#[async_trait]
impl GenerationModel for ProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SummaryError> {
        let start = Instant::now();
        let messages = build_messages(request);
        let options = self.policy.options();
        let max_retries = self.policy.max_retries;

        let mut last_err: Option<SummaryError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self.policy.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!("{}: retry {}/{} after {}ms", self.name(), attempt, max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.policy.timeout, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        self.name(),
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        return Err(SummaryError::EmptyResponse);
                    }
                    return Ok(Generation {
                        text: response.content,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                    });
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed — {}", self.name(), attempt + 1, e);
                    last_err = Some(SummaryError::ModelFailed {
                        retries: max_retries,
                        detail: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {:?}",
                        self.name(),
                        attempt + 1,
                        self.policy.timeout
                    );
                    last_err = Some(SummaryError::Timeout {
                        secs: self.policy.timeout.as_secs(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or(SummaryError::ModelFailed {
            retries: max_retries,
            detail: "Unknown error".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_from_default_config() {
        let config = InboxConfig::default();
        let policy = CallPolicy::from_config(&config);
        let opts = policy.options();
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.timeout, Duration::from_secs(120));
    }

    #[test]
    fn text_request_has_no_image() {
        let req = GenerationRequest::text("describe");
        assert!(req.image.is_none());
        assert_eq!(build_messages(&req).len(), 1);
    }

    #[test]
    fn image_request_carries_mime() {
        let req = GenerationRequest::with_image("describe", vec![0xFF, 0xD8], "image/jpeg");
        assert_eq!(req.image.as_ref().unwrap().mime_type, "image/jpeg");
        assert_eq!(build_messages(&req).len(), 1);
    }
}
