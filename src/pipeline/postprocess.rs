//! Post-processing: LaTeX prose → plain text.
//!
//! Runs over prose segments of an assembled document only; summaries are
//! already plain text. The rules are cheap deterministic regex/string
//! passes, each independently testable.
//!
//! ## Rule Order
//!
//! Comments go before anything else so a commented-out `\section{...}`
//! is not unwrapped into the text, and escapes are undone last so a
//! literal `\%` never starts a comment.

use once_cell::sync::Lazy;
use regex::Regex;

/// Convert one prose segment to plain text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Drop the preamble and `\end{document}`
/// 3. Strip comments
/// 4. Drop `\urlstyle{...}`, `\graphicspath{...}`, `\label{...}` and layout-only macros
/// 5. `\href{url}{text}` → `text (url)`, `\url{u}` → `u`
/// 6. Unwrap sectioning and formatting commands, keeping their argument
/// 7. Drop `\begin{...}` / `\end{...}` markers
/// 8. `\item` → `- `, `\\` → line break
/// 9. Unescape `\% \& \$ \# \_`
/// 10. Strip invisible Unicode
/// 11. Strip leading whitespace per line
/// 12. Collapse runs of blank lines to one
pub fn latex_to_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_document_frame(&s);
    let s = strip_comments(&s);
    let s = drop_noise_macros(&s);
    let s = rewrite_links(&s);
    let s = unwrap_commands(&s);
    let s = drop_environment_markers(&s);
    let s = rewrite_items_and_breaks(&s);
    let s = unescape_specials(&s);
    let s = remove_invisible_chars(&s);
    let s = strip_leading_whitespace(&s);
    collapse_blank_lines(&s)
}

/// Trim the end of the finished document to exactly one newline.
pub fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Document frame ───────────────────────────────────────────────────

static RE_BEGIN_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A.*?\\begin\{document\}").unwrap());
static RE_END_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\end\{document\}.*\z").unwrap());

fn strip_document_frame(input: &str) -> String {
    let s = RE_BEGIN_DOCUMENT.replace(input, "");
    RE_END_DOCUMENT.replace(&s, "").to_string()
}

// ── Rule 3: Comments ─────────────────────────────────────────────────────────

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(^|[^\\])%.*$").unwrap());

fn strip_comments(input: &str) -> String {
    RE_COMMENT.replace_all(input, "$1").to_string()
}

// ── Rule 4: Macros with no textual content ───────────────────────────────────

static RE_NOISE_WITH_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:urlstyle|graphicspath|label|setcounter|vspace|hspace)\*?\s*\{(?:[^{}]|\{[^{}]*\})*\}")
        .unwrap()
});
static RE_NOISE_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:maketitle|centering|noindent|hline|clearpage|newpage|medskip|bigskip|smallskip)\b")
        .unwrap()
});

fn drop_noise_macros(input: &str) -> String {
    let s = RE_NOISE_WITH_ARG.replace_all(input, "");
    RE_NOISE_BARE.replace_all(&s, "").to_string()
}

// ── Rule 5: Links ────────────────────────────────────────────────────────────

static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\href\s*\{([^{}]*)\}\s*\{([^{}]*)\}").unwrap());
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\url\s*\{([^{}]*)\}").unwrap());

fn rewrite_links(input: &str) -> String {
    let s = RE_HREF.replace_all(input, "$2 ($1)");
    RE_URL.replace_all(&s, "$1").to_string()
}

// ── Rule 6: Unwrap commands ──────────────────────────────────────────────────

static RE_UNWRAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\(?:part|chapter|section|subsection|subsubsection|paragraph|subparagraph|title|author|date|caption|footnote|textbf|textit|textsl|textsc|texttt|textrm|textsf|textup|emph|underline|mbox|text)\*?\s*\{([^{}]*)\}",
    )
    .unwrap()
});

/// Innermost groups are unwrapped first; repeat until nested commands are gone.
fn unwrap_commands(input: &str) -> String {
    let mut s = input.to_string();
    loop {
        let next = RE_UNWRAP.replace_all(&s, "$1").to_string();
        if next == s {
            return s;
        }
        s = next;
    }
}

// ── Rule 7: Environment markers ──────────────────────────────────────────────

static RE_ENV_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:begin|end)\s*\{[^{}]*\}(?:\[[^\]\n]*\])?").unwrap());

fn drop_environment_markers(input: &str) -> String {
    RE_ENV_MARKER.replace_all(input, "").to_string()
}

// ── Rule 8: Items and line breaks ────────────────────────────────────────────

static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\item\b(?:\[([^\]]*)\])?\s*").unwrap());
static RE_LINEBREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\\(?:\[[^\]]*\])?").unwrap());

fn rewrite_items_and_breaks(input: &str) -> String {
    let s = RE_ITEM.replace_all(input, |caps: &regex::Captures<'_>| match caps.get(1) {
        Some(label) => format!("\n- {} ", label.as_str()),
        None => "\n- ".to_string(),
    });
    RE_LINEBREAK.replace_all(&s, "\n").to_string()
}

// ── Rule 9: Escaped specials ─────────────────────────────────────────────────

fn unescape_specials(input: &str) -> String {
    input
        .replace("\\%", "%")
        .replace("\\&", "&")
        .replace("\\$", "$")
        .replace("\\#", "#")
        .replace("\\_", "_")
}

// ── Rule 10: Invisible Unicode ───────────────────────────────────────────────

/// Zero-width spaces, joiners, BOM and soft hyphens from the OCR layer.
fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Rule 11: Leading whitespace ──────────────────────────────────────────────

static RE_LEADING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]+").unwrap());

fn strip_leading_whitespace(input: &str) -> String {
    RE_LEADING_WS.replace_all(input, "").to_string()
}

// ── Rule 12: Blank lines ─────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_frame() {
        let input = "\\documentclass{article}\n\\usepackage{graphicx}\n\\begin{document}\nBody.\n\\end{document}\n";
        assert_eq!(latex_to_text(input), "\nBody.\n");
    }

    #[test]
    fn test_fragment_without_frame_is_kept() {
        assert_eq!(latex_to_text("Middle of the paper."), "Middle of the paper.");
    }

    #[test]
    fn test_comments_but_not_escaped_percent() {
        let input = "Accuracy rose by 12\\% % reviewer note\n% whole line\nNext";
        assert_eq!(latex_to_text(input), "Accuracy rose by 12% \n\nNext");
    }

    #[test]
    fn test_href_and_url() {
        let input = "See \\href{https://example.org}{the project page} or \\url{https://a.b}.";
        assert_eq!(
            latex_to_text(input),
            "See the project page (https://example.org) or https://a.b."
        );
    }

    #[test]
    fn test_sections_and_nested_formatting() {
        let input = "\\section*{Results}\nWe saw \\textbf{\\emph{large}} gains.";
        assert_eq!(latex_to_text(input), "Results\nWe saw large gains.");
    }

    #[test]
    fn test_noise_macros() {
        let input = "\\urlstyle{same}\\graphicspath{ {./images/} }\\maketitle Text\\label{sec:a}.";
        assert_eq!(latex_to_text(input), "Text.");
    }

    #[test]
    fn test_lists() {
        let input = "\\begin{itemize}\n  \\item first\n  \\item[b)] second\n\\end{itemize}";
        let out = latex_to_text(input);
        assert!(out.contains("- first"));
        assert!(out.contains("- b) second"));
        assert!(!out.contains("itemize"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(latex_to_text("R\\&D costs \\$5 for item \\#3 in col\\_a"), "R&D costs $5 for item #3 in col_a");
    }

    #[test]
    fn test_leading_whitespace_and_blank_lines() {
        let input = "  one\n\n\n\n\t two\n";
        assert_eq!(latex_to_text(input), "one\n\ntwo\n");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(latex_to_text("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("text\n\n\n"), "text\n");
        assert_eq!(ensure_final_newline("text"), "text\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }
}
