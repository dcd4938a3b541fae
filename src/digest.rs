//! Optional digest pass: one research summary per library document.
//!
//! Every `{output}/{stem}.txt` without a `{summaries}/{stem}.txt` is sent
//! to the text model whole, with [`crate::prompts::DIGEST_PROMPT`].
//! A failed digest is logged and reported; it never touches the source
//! text or the archive.

use crate::error::{InboxError, SummaryError};
use crate::pipeline::llm::{GenerationModel, GenerationRequest};
use crate::prompts::digest_request;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{info, warn};

/// Result of one digest pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestReport {
    /// Digests written in this pass.
    pub written: Vec<PathBuf>,
    /// Documents that already had a digest.
    pub skipped: usize,
    /// `(document, error)` pairs.
    pub failed: Vec<(String, String)>,
}

/// Whole-document summariser.
pub struct Digester {
    model: Arc<dyn GenerationModel>,
    focus: Option<String>,
    concurrency: usize,
}

impl Digester {
    pub fn new(model: Arc<dyn GenerationModel>) -> Self {
        Self {
            model,
            focus: None,
            concurrency: 2,
        }
    }

    /// Ask the model to pay particular attention to `topic`.
    pub fn with_focus(mut self, topic: impl Into<String>) -> Self {
        self.focus = Some(topic.into());
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub async fn digest_text(&self, text: &str) -> Result<String, SummaryError> {
        let request = GenerationRequest::text(digest_request(self.focus.as_deref(), text));
        let generation = self.model.generate(&request).await?;
        Ok(generation.text.trim().to_string())
    }

    /// Digest every undigested `.txt` in `library` into `summaries`.
    pub async fn digest_library(&self, library: &Path, summaries: &Path) -> Result<DigestReport, InboxError> {
        tokio::fs::create_dir_all(summaries)
            .await
            .map_err(|source| InboxError::DirectoryUnavailable {
                path: summaries.to_path_buf(),
                source,
            })?;
        let unreadable = |source| InboxError::InboxUnreadable {
            path: library.to_path_buf(),
            source,
        };

        let mut entries = ReadDirStream::new(tokio::fs::read_dir(library).await.map_err(unreadable)?);
        let mut todo = Vec::new();
        let mut report = DigestReport::default();

        while let Some(entry) = entries.next().await {
            let path = entry.map_err(unreadable)?.path();
            if path.extension().is_none_or(|e| e != "txt") {
                continue;
            }
            let Some(name) = path.file_name() else { continue };
            let target = summaries.join(name);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                report.skipped += 1;
            } else {
                todo.push((path, target));
            }
        }
        todo.sort();
        info!("Digest: {} to write, {} already present", todo.len(), report.skipped);

        let results: Vec<_> = stream::iter(todo)
            .map(|(source, target)| async move {
                let result = self.digest_file(&source, &target).await;
                (source, target, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (source, target, result) in results {
            match result {
                Ok(()) => report.written.push(target),
                Err(e) => {
                    let name = source.display().to_string();
                    warn!("Digest of {} failed: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }
        report.written.sort();
        Ok(report)
    }

    async fn digest_file(&self, source: &Path, target: &Path) -> Result<(), String> {
        let text = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| format!("read: {e}"))?;
        let digest = self.digest_text(&text).await.map_err(|e| e.to_string())?;

        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, digest.as_bytes()))
            .await
            .map_err(|e| format!("write task: {e}"))?
            .map_err(|e| format!("write: {e}"))
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::Generation;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixed;

    #[async_trait]
    impl GenerationModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, SummaryError> {
            if request.prompt.contains("UNSUMMARIZABLE") {
                return Err(SummaryError::EmptyResponse);
            }
            let focused = request.prompt.contains("related to: ");
            Ok(Generation {
                text: format!("  digest (focused: {focused})\n"),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn focus_reaches_the_prompt() {
        let d = Digester::new(Arc::new(Fixed)).with_focus("sample sizes");
        assert_eq!(d.digest_text("body").await.unwrap(), "digest (focused: true)");
        let plain = Digester::new(Arc::new(Fixed));
        assert_eq!(plain.digest_text("body").await.unwrap(), "digest (focused: false)");
    }

    #[tokio::test]
    async fn digests_only_missing_documents() {
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");
        let summaries = dir.path().join("summaries");
        std::fs::create_dir_all(&library).unwrap();
        std::fs::create_dir_all(&summaries).unwrap();
        std::fs::write(library.join("a.txt"), "paper a").unwrap();
        std::fs::write(library.join("b.txt"), "paper b").unwrap();
        std::fs::write(library.join("c.txt"), "UNSUMMARIZABLE").unwrap();
        std::fs::write(library.join("notes.md"), "ignored").unwrap();
        std::fs::write(summaries.join("b.txt"), "old digest").unwrap();
        std::fs::write(summaries.join("a.artifacts.json"), "{}").unwrap();

        let report = Digester::new(Arc::new(Fixed))
            .digest_library(&library, &summaries)
            .await
            .unwrap();

        assert_eq!(report.written, vec![summaries.join("a.txt")]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("c.txt"));
        assert_eq!(
            std::fs::read_to_string(summaries.join("a.txt")).unwrap(),
            "digest (focused: false)"
        );
        assert_eq!(std::fs::read_to_string(summaries.join("b.txt")).unwrap(), "old digest");
        assert!(!summaries.join("c.txt").exists());
    }
}
