//! Prompt templates and summary delimiters.
//!
//! Both artifact prompts ask the model to keep every number and every
//! stated relationship; the downstream corpus is only as good as what
//! survives the table/figure → prose rewrite.
//!
//! Callers can override the artifact prompts via
//! [`crate::config::InboxConfig::table_prompt`] and
//! [`crate::config::InboxConfig::image_prompt`].

/// Prompt for a table given as LaTeX source. The table follows the prompt.
pub const TABLE_PROMPT: &str = r#"You are preparing scientific papers for readers who cannot see tables. Below is one table from a paper, in LaTeX. Rewrite it as plain text:

1. Work out which rows form the header and which rows hold content.
2. For every content row, output: <Column 1 name>: <value>; <Column 2 name>: <value>; ...; <Last column name>: <value>
3. Put each row on its own line.
4. Never skip rows and never abbreviate with "etc." or similar. Every value in the table must appear in the output.
5. If the header spans several lines, a column's name is the comma-joined stack of its header cells.
6. If a header cell is merged across columns, repeat its text for every column it covers.
7. If the first column has no name, write its values without a colon.
8. Remove all TeX/LaTeX syntax; write math with plain symbols a layperson can read.
9. Output only the result. No introduction, no closing remarks.

Here is the table:"#;

/// Prompt for a figure sent as an image attachment.
pub const IMAGE_PROMPT: &str = r#"You are preparing scientific papers for readers who cannot see figures. The attached image is one figure from a paper. Describe it as plain text:

1. Decide what it is: a plot/graph/diagram, a photo, a schematic, or something else.
2. For a plot, graph or diagram: state its purpose if a caption or title is visible, name every axis or dimension with its units, and estimate and list every data value shown, repeating the metric name next to each value.
3. For a photo: describe what is depicted.
4. For a schematic: describe every element and every connection between elements.
5. For anything else: describe it in enough detail that an artist could reproduce it exactly.
6. Never skip values and never abbreviate with "etc." or similar.
7. Output only the description. No introduction, no closing remarks."#;

/// Prompt for the optional whole-document digest. The document follows.
pub const DIGEST_PROMPT: &str = r#"You are given the full text of a research paper. Write a detailed summary of it:

- State the research question, the methods, the data and the main findings.
- Keep every quantitative result that supports a finding, with its units and the condition it was measured under.
- For each claim, say whether the authors demonstrated it, assumed it, or cited it from other work.
- Describe the limitations and the context in which the results apply.

The text contains inline table and figure descriptions delimited with <===TABLE START===> ... <===TABLE END===> and <===IMAGE START===> ... <===IMAGE END===>. The prose before and after such a block is continuous."#;

pub const TABLE_START: &str = "<===TABLE START===>";
pub const TABLE_END: &str = "<===TABLE END===>";
pub const IMAGE_START: &str = "<===IMAGE START===>";
pub const IMAGE_END: &str = "<===IMAGE END===>";

/// Build the user message for a table summary.
pub fn table_request(prompt: &str, latex: &str) -> String {
    format!("{prompt}\n{latex}")
}

/// Build the user message for a digest.
pub fn digest_request(focus: Option<&str>, text: &str) -> String {
    match focus {
        Some(topic) if !topic.trim().is_empty() => format!(
            "{DIGEST_PROMPT}\nPay particular attention to everything related to: {}.\n\nText:\n\"\"\"{text}\"\"\"",
            topic.trim()
        ),
        _ => format!("{DIGEST_PROMPT}\n\nText:\n\"\"\"{text}\"\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_request_appends_source() {
        let msg = table_request(TABLE_PROMPT, r"\begin{tabular}{cc}a&b\end{tabular}");
        assert!(msg.starts_with("You are preparing"));
        assert!(msg.ends_with(r"\end{tabular}"));
    }

    #[test]
    fn digest_focus_is_optional() {
        let plain = digest_request(None, "body");
        assert!(!plain.contains("particular attention"));
        let focused = digest_request(Some("cognitive load"), "body");
        assert!(focused.contains("related to: cognitive load."));
        assert_eq!(digest_request(Some("  "), "body"), plain);
    }

    #[test]
    fn digest_prompt_names_the_delimiters() {
        assert!(DIGEST_PROMPT.contains(TABLE_START));
        assert!(DIGEST_PROMPT.contains(IMAGE_END));
    }
}
