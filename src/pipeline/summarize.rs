//! Summarizer: turn each table or figure into prose.
//!
//! Routing is an explicit match on [`ArtifactPayload`]:
//!
//! - `Table` → text-only model, table prompt followed by the LaTeX source;
//! - `Image` → multimodal model, image prompt with the figure attached.
//!
//! A failed artifact never fails the document. Its summary carries the
//! [`SummaryError`] and a placeholder text, and [`SummaryBatch::failures`]
//! counts it.

use crate::error::SummaryError;
use crate::pipeline::bundle::MarkupBundle;
use crate::pipeline::encode::prepare_image;
use crate::pipeline::extract::{ArtifactKind, ArtifactPayload, EmbeddedArtifact};
use crate::pipeline::llm::{Generation, GenerationModel, GenerationRequest};
use crate::prompts::{table_request, IMAGE_PROMPT, TABLE_PROMPT};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prompt pair used by the summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPrompts {
    pub table: String,
    pub image: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            table: TABLE_PROMPT.to_string(),
            image: IMAGE_PROMPT.to_string(),
        }
    }
}

/// Replacement text for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Index of the [`EmbeddedArtifact`] this summary replaces.
    pub artifact_index: usize,
    pub kind: ArtifactKind,
    pub text: String,
    /// Set when `text` is a placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SummaryError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ArtifactSummary {
    fn generated(artifact: &EmbeddedArtifact, generation: Generation) -> Self {
        Self {
            artifact_index: artifact.index,
            kind: artifact.kind(),
            text: generation.text.trim().to_string(),
            error: None,
            input_tokens: generation.input_tokens,
            output_tokens: generation.output_tokens,
        }
    }

    fn placeholder(artifact: &EmbeddedArtifact, error: SummaryError) -> Self {
        let kind = artifact.kind();
        Self {
            artifact_index: artifact.index,
            kind,
            text: format!("[{} summary unavailable: {}]", kind.label(), error),
            error: Some(error),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

/// Summaries of one document, in artifact order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryBatch {
    pub summaries: Vec<ArtifactSummary>,
    pub failures: usize,
}

impl SummaryBatch {
    pub fn total_tokens(&self) -> (usize, usize) {
        self.summaries.iter().fold((0, 0), |(i, o), s| {
            (i + s.input_tokens, o + s.output_tokens)
        })
    }
}

/// Routes artifacts to the text-only or multimodal model.
#[derive(Clone)]
pub struct Summarizer {
    text_model: Arc<dyn GenerationModel>,
    vision_model: Arc<dyn GenerationModel>,
    prompts: SummaryPrompts,
    concurrency: usize,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("text_model", &self.text_model.name())
            .field("vision_model", &self.vision_model.name())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Summarizer {
    pub fn new(text_model: Arc<dyn GenerationModel>, vision_model: Arc<dyn GenerationModel>) -> Self {
        Self {
            text_model,
            vision_model,
            prompts: SummaryPrompts::default(),
            concurrency: 4,
        }
    }

    pub fn with_prompts(mut self, prompts: SummaryPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// The text-only model, shared with the digest pass.
    pub fn text_model(&self) -> Arc<dyn GenerationModel> {
        Arc::clone(&self.text_model)
    }

    /// Summarize one artifact. Never fails; see [`ArtifactSummary::error`].
    pub async fn summarize(&self, artifact: &EmbeddedArtifact, bundle: &MarkupBundle) -> ArtifactSummary {
        match self.generate(artifact, bundle).await {
            Ok(generation) => {
                debug!(
                    "Artifact {} ({}): {} chars",
                    artifact.index,
                    artifact.kind().label(),
                    generation.text.len()
                );
                ArtifactSummary::generated(artifact, generation)
            }
            Err(e) => {
                warn!(
                    "Artifact {} ({}): summary failed — {}",
                    artifact.index,
                    artifact.kind().label(),
                    e
                );
                ArtifactSummary::placeholder(artifact, e)
            }
        }
    }

    async fn generate(&self, artifact: &EmbeddedArtifact, bundle: &MarkupBundle) -> Result<Generation, SummaryError> {
        let generation = match &artifact.payload {
            ArtifactPayload::Table { latex } => {
                let request = GenerationRequest::text(table_request(&self.prompts.table, latex));
                self.text_model.generate(&request).await?
            }
            ArtifactPayload::Image { reference } => {
                let bytes = bundle.image(reference).ok_or_else(|| SummaryError::MissingImage {
                    reference: reference.clone(),
                })?;
                let (data, mime) = prepare_image(bytes).map_err(|e| SummaryError::UnreadableImage {
                    reference: reference.clone(),
                    detail: e.to_string(),
                })?;
                let request = GenerationRequest::with_image(self.prompts.image.as_str(), data, mime);
                self.vision_model.generate(&request).await?
            }
        };
        if generation.text.trim().is_empty() {
            return Err(SummaryError::EmptyResponse);
        }
        Ok(generation)
    }

    /// Summarize every artifact concurrently; results come back in
    /// artifact order regardless of completion order.
    pub async fn summarize_all(&self, artifacts: &[EmbeddedArtifact], bundle: &MarkupBundle) -> SummaryBatch {
        let mut summaries: Vec<ArtifactSummary> = stream::iter(artifacts)
            .map(|artifact| self.summarize(artifact, bundle))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        summaries.sort_by_key(|s| s.artifact_index);

        let failures = summaries.iter().filter(|s| s.is_placeholder()).count();
        SummaryBatch { summaries, failures }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::extract::extract;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes a short description; fails when the prompt contains `fail_on`.
    pub(crate) struct EchoModel {
        pub(crate) label: &'static str,
        pub(crate) fail_on: Option<&'static str>,
        pub(crate) calls: AtomicUsize,
    }

    impl EchoModel {
        pub(crate) fn new(label: &'static str) -> Self {
            Self {
                label,
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_on(label: &'static str, needle: &'static str) -> Self {
            Self {
                fail_on: Some(needle),
                ..Self::new(label)
            }
        }
    }

    #[async_trait]
    impl GenerationModel for EchoModel {
        fn name(&self) -> &str {
            self.label
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SummaryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // Later calls finish first, so ordering must come from the sort.
            tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n as u64 * 5))).await;
            if self.fail_on.is_some_and(|needle| request.prompt.contains(needle)) {
                return Err(SummaryError::ModelFailed {
                    retries: 3,
                    detail: "HTTP 503".into(),
                });
            }
            let attached = request.image.as_ref().map_or(0, |i| i.data.len());
            Ok(Generation {
                text: format!("{} saw {} prompt chars and {} image bytes", self.label, request.prompt.len(), attached),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn png() -> Vec<u8> {
        use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn summarizer(text: EchoModel, vision: EchoModel) -> Summarizer {
        Summarizer::new(Arc::new(text), Arc::new(vision))
    }

    #[tokio::test]
    async fn routes_by_kind() {
        let bundle = MarkupBundle::from_markup(
            "\\begin{tabular}{c}1\\end{tabular} \\includegraphics{fig}",
        )
        .with_image("fig.png", png());
        let ex = extract(&bundle.markup);
        let s = summarizer(EchoModel::new("text"), EchoModel::new("vision"));

        let batch = s.summarize_all(&ex.artifacts, &bundle).await;
        assert_eq!(batch.failures, 0);
        assert_eq!(batch.summaries.len(), 2);
        assert!(batch.summaries[0].text.starts_with("text saw"));
        assert!(batch.summaries[0].text.ends_with("0 image bytes"));
        assert!(batch.summaries[1].text.starts_with("vision saw"));
        assert!(!batch.summaries[1].text.ends_with(" 0 image bytes"));
        assert_eq!(batch.total_tokens(), (20, 10));
    }

    #[tokio::test]
    async fn results_follow_artifact_order() {
        let markup: String = (0..6)
            .map(|i| format!("\\begin{{tabular}}{{c}}{i}\\end{{tabular}}\n"))
            .collect();
        let bundle = MarkupBundle::from_markup(markup);
        let ex = extract(&bundle.markup);
        let s = summarizer(EchoModel::new("text"), EchoModel::new("vision")).with_concurrency(6);

        let batch = s.summarize_all(&ex.artifacts, &bundle).await;
        let order: Vec<usize> = batch.summaries.iter().map(|s| s.artifact_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn failure_becomes_placeholder() {
        let bundle = MarkupBundle::from_markup(
            "\\begin{tabular}{c}good\\end{tabular}\\begin{tabular}{c}BROKEN\\end{tabular}",
        );
        let ex = extract(&bundle.markup);
        let s = summarizer(EchoModel::failing_on("text", "BROKEN"), EchoModel::new("vision"));

        let batch = s.summarize_all(&ex.artifacts, &bundle).await;
        assert_eq!(batch.summaries.len(), 2);
        assert_eq!(batch.failures, 1);
        let failed = &batch.summaries[1];
        assert!(failed.is_placeholder());
        assert!(failed.text.starts_with("[table summary unavailable: model call failed"));
    }

    #[tokio::test]
    async fn missing_image_is_reported() {
        let bundle = MarkupBundle::from_markup("\\includegraphics{nowhere}");
        let ex = extract(&bundle.markup);
        let s = summarizer(EchoModel::new("text"), EchoModel::new("vision"));

        let summary = s.summarize(&ex.artifacts[0], &bundle).await;
        assert_eq!(
            summary.error,
            Some(SummaryError::MissingImage {
                reference: "nowhere".into()
            })
        );
        assert!(summary.text.starts_with("[image summary unavailable:"));
    }

    #[tokio::test]
    async fn undecodable_image_is_reported() {
        let bundle = MarkupBundle::from_markup("\\includegraphics{junk}").with_image("junk.bin", b"not an image".to_vec());
        let ex = extract(&bundle.markup);
        let s = summarizer(EchoModel::new("text"), EchoModel::new("vision"));

        let summary = s.summarize(&ex.artifacts[0], &bundle).await;
        assert!(matches!(summary.error, Some(SummaryError::UnreadableImage { .. })));
    }

    #[tokio::test]
    async fn no_artifacts_no_calls() {
        let text = Arc::new(EchoModel::new("text"));
        let s = Summarizer::new(text.clone(), Arc::new(EchoModel::new("vision")));
        let batch = s.summarize_all(&[], &MarkupBundle::default()).await;
        assert!(batch.summaries.is_empty());
        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    }
}
