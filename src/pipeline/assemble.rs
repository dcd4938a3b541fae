//! Document Assembler: single in-order pass replacing each artifact span
//! with its summary.
//!
//! The result keeps prose and summaries as separate segments so the
//! plain-text cleanup can run over prose only.

use crate::error::AssemblyError;
use crate::pipeline::extract::{ArtifactKind, EmbeddedArtifact};
use crate::pipeline::summarize::ArtifactSummary;
use crate::prompts::{IMAGE_END, IMAGE_START, TABLE_END, TABLE_START};

/// Piece of the final document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Markup outside every artifact span, byte-for-byte.
    Prose(String),
    /// Summary standing where an artifact was.
    Summary { kind: ArtifactKind, text: String },
}

/// Assembled plain-text output for one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalTextDocument {
    segments: Vec<Segment>,
}

impl FinalTextDocument {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn summary_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Summary { .. }))
            .count()
    }

    /// Rewrite every prose segment; summaries are left alone.
    pub fn map_prose(self, f: impl Fn(&str) -> String) -> Self {
        let segments = self
            .segments
            .into_iter()
            .map(|seg| match seg {
                Segment::Prose(p) => Segment::Prose(f(&p)),
                s => s,
            })
            .collect();
        Self { segments }
    }

    /// Render the document, wrapping summaries in their delimiters.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Prose(p) => out.push_str(p),
                Segment::Summary { kind, text } => {
                    let (start, end) = delimiters(*kind);
                    out.push_str(start);
                    out.push('\n');
                    out.push_str(text);
                    out.push('\n');
                    out.push_str(end);
                }
            }
        }
        out
    }
}

fn delimiters(kind: ArtifactKind) -> (&'static str, &'static str) {
    match kind {
        ArtifactKind::Table => (TABLE_START, TABLE_END),
        ArtifactKind::Image => (IMAGE_START, IMAGE_END),
    }
}

/// Replace each artifact span in `markup` with the matching summary.
///
/// `artifacts` and `summaries` must pair up one-to-one in document order
/// with non-overlapping, in-bounds spans.
pub fn assemble(
    markup: &str,
    artifacts: &[EmbeddedArtifact],
    summaries: &[ArtifactSummary],
) -> Result<FinalTextDocument, AssemblyError> {
    if artifacts.len() != summaries.len() {
        return Err(AssemblyError::CountMismatch {
            artifacts: artifacts.len(),
            summaries: summaries.len(),
        });
    }

    let mut segments = Vec::with_capacity(artifacts.len() * 2 + 1);
    let mut cursor = 0;

    for (artifact, summary) in artifacts.iter().zip(summaries) {
        if summary.artifact_index != artifact.index {
            return Err(AssemblyError::OutOfOrder {
                expected: artifact.index,
                found: summary.artifact_index,
            });
        }
        let (start, end) = (artifact.span.start, artifact.span.end);
        if start < cursor {
            return Err(AssemblyError::Overlap {
                index: artifact.index,
                start,
                end,
                previous_end: cursor,
            });
        }
        let prose = markup
            .get(cursor..start)
            .filter(|_| markup.get(start..end).is_some())
            .ok_or(AssemblyError::OutOfBounds {
                index: artifact.index,
                start,
                end,
                len: markup.len(),
            })?;
        if !prose.is_empty() {
            segments.push(Segment::Prose(prose.to_string()));
        }
        segments.push(Segment::Summary {
            kind: summary.kind,
            text: summary.text.clone(),
        });
        cursor = end;
    }

    if cursor < markup.len() {
        segments.push(Segment::Prose(markup[cursor..].to_string()));
    }

    Ok(FinalTextDocument { segments })
}
