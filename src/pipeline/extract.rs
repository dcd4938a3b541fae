//! Content extraction: locate tables and figures in converted LaTeX.
//!
//! Recognised constructs:
//!
//! | Kind  | Construct | Span |
//! |-------|-----------|------|
//! | table | `\begin{tabular}` … matching `\end{tabular}` (also `tabular*`, `tabularx`, `longtable`) | whole environment |
//! | image | `\includegraphics[opts]{name}` (optional `*` and `[opts]`) | macro and arguments |
//!
//! The scan is a single forward pass. Comments (`%` to end of line) and
//! escaped characters are stepped over, nested environments of the same
//! name are balanced, and anything inside a table span belongs to that
//! table. Text outside the spans is never touched.
//!
//! A marker that cannot be closed (unterminated environment, missing or
//! unclosed `{name}`, paragraph break inside an argument) yields an
//! [`ExtractionWarning`]; the marker is skipped and scanning resumes right
//! after it.

use crate::error::ExtractionWarning;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::warn;

/// Table environments whose whole body becomes one artifact.
pub const TABLE_ENVIRONMENTS: &[&str] = &["tabular", "tabular*", "tabularx", "longtable"];

const INCLUDEGRAPHICS: &str = "\\includegraphics";

/// Artifact kind, used for routing and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Table,
    Image,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Table => "table",
            ArtifactKind::Image => "image",
        }
    }
}

/// What each kind carries into summarisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactPayload {
    /// LaTeX source of the table environment.
    Table { latex: String },
    /// File reference from `\includegraphics{...}`.
    Image { reference: String },
}

/// A table or figure found in the markup. Replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedArtifact {
    /// Position among the document's artifacts (0-based, document order).
    pub index: usize,
    /// Byte range in the markup.
    pub span: Range<usize>,
    pub payload: ArtifactPayload,
}

impl EmbeddedArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self.payload {
            ArtifactPayload::Table { .. } => ArtifactKind::Table,
            ArtifactPayload::Image { .. } => ArtifactKind::Image,
        }
    }
}

/// Result of scanning one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// In document order, non-overlapping.
    pub artifacts: Vec<EmbeddedArtifact>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Scan `markup` for tables and figures.
pub fn extract(markup: &str) -> Extraction {
    let bytes = markup.as_bytes();
    let mut out = Extraction::default();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => i = skip_comment(bytes, i),
            b'\\' => {
                let rest = &markup[i..];
                if is_escape(bytes, i) {
                    i += 2;
                    continue;
                }

                if let Some((Marker::Begin, env, len)) = env_marker(rest) {
                    if TABLE_ENVIRONMENTS.contains(&env) {
                        match find_env_end(markup, i + len, env) {
                            Some(end) => {
                                push(&mut out, i..end, ArtifactPayload::Table {
                                    latex: markup[i..end].to_string(),
                                });
                                i = end;
                            }
                            None => {
                                warning(&mut out, i, format!("unterminated \\begin{{{env}}}"));
                                i += len;
                            }
                        }
                        continue;
                    }
                    i += len;
                    continue;
                }

                if starts_with_command(rest, INCLUDEGRAPHICS) {
                    match parse_includegraphics(markup, i) {
                        Ok((end, reference)) => {
                            push(&mut out, i..end, ArtifactPayload::Image { reference });
                            i = end;
                        }
                        Err(msg) => {
                            warning(&mut out, i, format!("{INCLUDEGRAPHICS}: {msg}"));
                            i += INCLUDEGRAPHICS.len();
                        }
                    }
                    continue;
                }

                i += 1;
            }
            _ => i += 1,
        }
    }

    out
}

fn push(out: &mut Extraction, span: Range<usize>, payload: ArtifactPayload) {
    let index = out.artifacts.len();
    out.artifacts.push(EmbeddedArtifact {
        index,
        span,
        payload,
    });
}

fn warning(out: &mut Extraction, offset: usize, message: String) {
    warn!("Skipping malformed marker at byte {}: {}", offset, message);
    out.warnings.push(ExtractionWarning { offset, message });
}

// ── Lexical helpers ──────────────────────────────────────────────────────

/// `\` followed by a non-letter: `\\`, `\%`, `\{`, …
fn is_escape(bytes: &[u8], i: usize) -> bool {
    bytes
        .get(i + 1)
        .is_some_and(|b| b.is_ascii() && !b.is_ascii_alphabetic())
}

/// Index just past the newline ending the comment at `i`.
fn skip_comment(bytes: &[u8], i: usize) -> usize {
    bytes[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| i + p + 1)
}

/// `rest` starts with control word `cmd` (not a longer word like `\includegraphicsx`).
fn starts_with_command(rest: &str, cmd: &str) -> bool {
    rest.starts_with(cmd)
        && !rest[cmd.len()..]
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Begin,
    End,
}

/// Parse `\begin{name}` / `\end{name}` at the start of `rest`.
/// Returns the marker, the environment name, and the byte length consumed.
fn env_marker(rest: &str) -> Option<(Marker, &str, usize)> {
    let (marker, cmd) = if starts_with_command(rest, "\\begin") {
        (Marker::Begin, "\\begin")
    } else if starts_with_command(rest, "\\end") {
        (Marker::End, "\\end")
    } else {
        return None;
    };
    let after = &rest[cmd.len()..];
    let ws = after.len() - after.trim_start_matches([' ', '\t']).len();
    let arg = &after[ws..];
    if !arg.starts_with('{') {
        return None;
    }
    let close = arg.find('}')?;
    let name = arg[1..close].trim();
    if name.is_empty() || name.contains(['{', '\n']) {
        return None;
    }
    Some((marker, name, cmd.len() + ws + close + 1))
}

/// Byte index just past the `\end{env}` balancing a `\begin{env}` whose
/// token ends at `from`.
fn find_env_end(markup: &str, from: usize, env: &str) -> Option<usize> {
    let bytes = markup.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => i = skip_comment(bytes, i),
            b'\\' if is_escape(bytes, i) => i += 2,
            b'\\' => match env_marker(&markup[i..]) {
                Some((marker, name, len)) if name == env => {
                    i += len;
                    match marker {
                        Marker::Begin => depth += 1,
                        Marker::End if depth == 0 => return Some(i),
                        Marker::End => depth -= 1,
                    }
                }
                Some((_, _, len)) => i += len,
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    None
}

/// Parse `\includegraphics*[opts]{name}` starting at `start`.
/// Returns the end of the construct and the trimmed file reference.
fn parse_includegraphics(markup: &str, start: usize) -> Result<(usize, String), String> {
    let bytes = markup.as_bytes();
    let mut i = start + INCLUDEGRAPHICS.len();

    if bytes.get(i) == Some(&b'*') {
        i += 1;
    }
    i = skip_inline_space(bytes, i);

    if bytes.get(i) == Some(&b'[') {
        i = close_group(bytes, i, b'[', b']').ok_or("unterminated [options]")?;
        i = skip_inline_space(bytes, i);
    }

    if bytes.get(i) != Some(&b'{') {
        return Err("missing {file} argument".into());
    }
    let open = i;
    let end = close_group(bytes, open, b'{', b'}').ok_or("unterminated {file} argument")?;
    let reference = markup[open + 1..end - 1].trim();
    if reference.is_empty() {
        return Err("empty {file} argument".into());
    }
    Ok((end, reference.to_string()))
}

/// Spaces, tabs and at most one newline (a blank line ends the macro).
fn skip_inline_space(bytes: &[u8], mut i: usize) -> usize {
    let mut newlines = 0;
    while let Some(&b) = bytes.get(i) {
        match b {
            b' ' | b'\t' | b'\r' => i += 1,
            b'\n' if newlines == 0 => {
                newlines += 1;
                i += 1;
            }
            _ => break,
        }
    }
    i
}

/// Index just past the delimiter closing the group opened at `open`.
/// Fails on end of input or on a paragraph break inside the group.
fn close_group(bytes: &[u8], open: usize, left: u8, right: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    let mut line_blank = false;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' if is_escape(bytes, i) => {
                i += 2;
                line_blank = false;
                continue;
            }
            b'\n' => {
                if line_blank {
                    return None;
                }
                line_blank = true;
            }
            b' ' | b'\t' | b'\r' => {}
            _ if b == left => {
                depth += 1;
                line_blank = false;
            }
            _ if b == right => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
                line_blank = false;
            }
            _ => line_blank = false,
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\\begin{tabular}{|c|c|}\n\\hline a & b \\\\\n1 & 2 \\\\\n\\end{tabular}";

    #[test]
    fn no_artifacts_in_plain_prose() {
        let ex = extract("Just some text with $x^2$ and 50\\% accuracy.");
        assert!(ex.artifacts.is_empty());
        assert!(ex.warnings.is_empty());
    }

    #[test]
    fn finds_table_and_image_in_order() {
        let markup = format!(
            "Intro.\n{TABLE}\nMiddle.\n\\includegraphics[max width=\\textwidth, center]{{2024_05_01_abc-1}}\nEnd."
        );
        let ex = extract(&markup);
        assert_eq!(ex.artifacts.len(), 2);

        let t = &ex.artifacts[0];
        assert_eq!(t.index, 0);
        assert_eq!(t.kind(), ArtifactKind::Table);
        assert_eq!(&markup[t.span.clone()], TABLE);

        let img = &ex.artifacts[1];
        assert_eq!(img.index, 1);
        assert_eq!(
            img.payload,
            ArtifactPayload::Image {
                reference: "2024_05_01_abc-1".into()
            }
        );
        assert!(markup[img.span.clone()].starts_with("\\includegraphics["));
        assert!(markup[img.span.end..].starts_with("\nEnd."));
        assert!(t.span.end <= img.span.start);
    }

    #[test]
    fn nested_tabular_is_one_artifact() {
        let markup = "\\begin{tabular}{c}\\begin{tabular}{c}x\\end{tabular}\\end{tabular} tail";
        let ex = extract(markup);
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(ex.artifacts[0].span, 0..markup.len() - " tail".len());
    }

    #[test]
    fn image_inside_table_belongs_to_table() {
        let markup = "\\begin{tabular}{c}\\includegraphics{x}\\end{tabular}";
        let ex = extract(markup);
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(ex.artifacts[0].kind(), ArtifactKind::Table);
    }

    #[test]
    fn commented_markers_are_ignored() {
        let markup = "% \\includegraphics{old}\n% \\begin{tabular}{c}\nText \\% not a comment \\includegraphics{new}";
        let ex = extract(markup);
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(
            ex.artifacts[0].payload,
            ArtifactPayload::Image {
                reference: "new".into()
            }
        );
    }

    #[test]
    fn unterminated_table_warns_and_continues() {
        let markup = "\\begin{tabular}{cc} a & b\n\nLater \\includegraphics{fig}";
        let ex = extract(markup);
        assert_eq!(ex.warnings.len(), 1);
        assert_eq!(ex.warnings[0].offset, 0);
        assert!(ex.warnings[0].message.contains("unterminated"));
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(ex.artifacts[0].kind(), ArtifactKind::Image);
        assert_eq!(ex.artifacts[0].index, 0);
    }

    #[test]
    fn malformed_includegraphics_is_skipped() {
        let markup = "A \\includegraphics[width=3cm\n\nB \\includegraphics{ } C \\includegraphics{ok}";
        let ex = extract(markup);
        assert_eq!(ex.warnings.len(), 2);
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(
            ex.artifacts[0].payload,
            ArtifactPayload::Image {
                reference: "ok".into()
            }
        );
    }

    #[test]
    fn unclosed_file_argument_is_skipped() {
        let ex = extract("\\includegraphics{fig-1\n\nrest of the paper");
        assert!(ex.artifacts.is_empty());
        assert_eq!(ex.warnings.len(), 1);
    }

    #[test]
    fn other_environments_and_longer_commands_are_not_artifacts() {
        let ex = extract("\\begin{table}\\caption{T}\\end{table} \\includegraphicsx{a} \\begin{tabularnotes}x\\end{tabularnotes}");
        assert!(ex.artifacts.is_empty());
        assert!(ex.warnings.is_empty());
    }

    #[test]
    fn starred_and_spaced_forms() {
        let ex = extract("\\includegraphics* [scale=0.5] {a.png} \\begin {tabular*}{\\linewidth}{cc}1&2\\end{tabular*}");
        assert_eq!(ex.artifacts.len(), 2);
        assert_eq!(ex.artifacts[1].kind(), ArtifactKind::Table);
    }

    #[test]
    fn multibyte_text_is_safe() {
        let markup = "Größe – µm \\includegraphics{fig-ä} café";
        let ex = extract(markup);
        assert_eq!(ex.artifacts.len(), 1);
        assert_eq!(&markup[ex.artifacts[0].span.clone()], "\\includegraphics{fig-ä}");
    }
}
