//! Turns a winning chunk into user-facing answer text.
//!
//! Prose chunks have markdown decoration stripped. Chunks that contain a
//! markdown table keep their table rows verbatim, so aligned content such
//! as pricing columns survives into the answer.

use crate::retrieval::snapshot::Chunk;
use regex::Regex;
use std::sync::OnceLock;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*#{1,6}\s*").unwrap())
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").unwrap())
}

fn italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*(.*?)\*").unwrap())
}

fn list_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*[-+*]\s+").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn separator_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|[\s:|-]+\|$").unwrap())
}

/// Formats retrieval results into plain answer text.
#[derive(Debug, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Render the winning chunk, attributed to its source document.
    pub fn format(&self, chunk: &Chunk) -> String {
        let body = if contains_table(&chunk.text) {
            format_with_table(&chunk.text)
        } else {
            clean_markdown(&chunk.text)
        };
        format!(
            "From our {} documentation:\n\n{}",
            titleize(&chunk.document_id),
            body.trim()
        )
    }

    /// Fallback answer when no candidate clears a threshold. `topics` are
    /// document ids of near misses, already ordered by relevance.
    pub fn no_match(&self, topics: &[String]) -> String {
        if topics.is_empty() {
            return "I couldn't find anything about that in the knowledge base. \
                    Try rephrasing your question, or ask me what topics I can help with."
                .to_string();
        }
        let suggestions: Vec<String> = topics.iter().map(|t| titleize(t)).collect();
        format!(
            "I couldn't find a direct answer to that. You might find what you \
             need in these topics: {}.",
            suggestions.join(", ")
        )
    }
}

/// `password-reset` or `password_reset` becomes `Password Reset`.
pub fn titleize(document_id: &str) -> String {
    document_id
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.matches('|').count() >= 2
}

fn contains_table(text: &str) -> bool {
    text.lines().filter(|line| is_table_row(line)).count() >= 2
}

/// Keep table rows verbatim (with separator rows normalized) and clean the
/// surrounding prose.
fn format_with_table(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        if is_table_row(line) {
            let trimmed = line.trim();
            if separator_row_re().is_match(trimmed) {
                let columns = trimmed.matches('|').count() - 1;
                out.push(format!("|{}", "---------|".repeat(columns)));
            } else {
                out.push(trimmed.to_string());
            }
        } else {
            let cleaned = clean_markdown(line);
            out.push(cleaned);
        }
    }
    out.join("\n")
}

fn clean_markdown(text: &str) -> String {
    let text = heading_re().replace_all(text, "");
    let text = bold_re().replace_all(&text, "$1");
    let text = italic_re().replace_all(&text, "$1");
    let text = list_marker_re().replace_all(&text, "\u{2022} ");
    let text = text.replace('`', "");
    blank_run_re().replace_all(&text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: &str, text: &str) -> Chunk {
        Chunk {
            id: format!("{document_id}#0"),
            document_id: document_id.to_string(),
            sequence: 0,
            text: text.to_string(),
            normalized_text: kbqa_context::normalize(text),
            embedding: None,
        }
    }

    #[test]
    fn prose_loses_markdown_decoration() {
        let c = chunk(
            "setup-guide",
            "## Installation\n\nRun the **installer** and follow the *prompts*.\n\n- Step one\n- Step two",
        );
        let formatted = ResponseFormatter::new().format(&c);
        assert!(formatted.starts_with("From our Setup Guide documentation:"));
        assert!(formatted.contains("Run the installer and follow the prompts."));
        assert!(formatted.contains("\u{2022} Step one"));
        assert!(!formatted.contains('#'));
        assert!(!formatted.contains("**"));
    }

    #[test]
    fn table_rows_survive_verbatim() {
        let c = chunk(
            "pricing",
            "## Plans\n\n| Plan | Price |\n|------|-------|\n| Basic | $10/mo |\n| Enterprise | $50/mo |",
        );
        let formatted = ResponseFormatter::new().format(&c);
        assert!(formatted.contains("| Plan | Price |"));
        assert!(formatted.contains("| Enterprise | $50/mo |"));
        assert!(formatted.contains("$50"));
    }

    #[test]
    fn separator_rows_are_normalized() {
        let c = chunk("pricing", "| A | B |\n| :--- | ---: |\n| 1 | 2 |");
        let formatted = ResponseFormatter::new().format(&c);
        assert!(formatted.contains("|---------|---------|"));
        assert!(!formatted.contains(":---"));
    }

    #[test]
    fn no_match_lists_topics() {
        let formatter = ResponseFormatter::new();
        let text = formatter.no_match(&["pricing".into(), "setup-guide".into()]);
        assert!(text.contains("Pricing"));
        assert!(text.contains("Setup Guide"));

        let generic = formatter.no_match(&[]);
        assert!(generic.contains("couldn't find anything"));
    }

    #[test]
    fn titleize_handles_separators() {
        assert_eq!(titleize("password-reset"), "Password Reset");
        assert_eq!(titleize("api_reference"), "Api Reference");
        assert_eq!(titleize("faq"), "Faq");
    }
}
