//! Markdown chunking and lexical normalization.
//!
//! Documents are split into non-overlapping units at structural boundaries:
//! a heading opens a new unit and the paragraphs under it are absorbed until
//! the configured length cap is reached. Blank lines separate paragraphs, so
//! a markdown table (consecutive `|`-delimited rows) always arrives as a
//! single block and stays intact whenever it fits the cap - downstream
//! formatting relies on the row structure surviving chunking. Oversized
//! blocks are split at sentence boundaries, then line boundaries, then (as a
//! last resort) at character boundaries.
//!
//! [`normalize`] produces the canonical form used for keyword matching:
//! lowercased, punctuation and markdown syntax stripped, whitespace
//! collapsed. The same function is applied to queries and to chunk text so
//! the two sides compare like-for-like.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Words ignored when computing token overlap between a query and a chunk.
///
/// Matching the original system's behavior: question scaffolding ("what",
/// "how much") should not create lexical overlap on its own.
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "can", "do", "does", "for", "how", "i", "in", "is", "it",
    "its", "me", "my", "of", "on", "or", "our", "s", "t", "tell", "that", "the", "this", "to",
    "was", "we", "what", "whats", "which", "with", "you", "your",
];

/// Returns true if `token` carries no retrieval signal on its own.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Normalize text for lexical matching: lowercase, strip punctuation and
/// markdown syntax, collapse whitespace.
///
/// ```
/// use kbqa_context::normalize;
/// assert_eq!(normalize("## What's the **Enterprise** plan?"), "what s the enterprise plan");
/// ```
pub fn normalize(text: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap());
    let lowered = text.to_lowercase();
    non_word.replace_all(&lowered, " ").trim().to_string()
}

/// Split normalized text into tokens, dropping stopwords.
pub fn content_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|t| !is_stopword(t))
        .collect()
}

/// A retrievable unit of text derived from one document.
///
/// Chunks are rebuilt wholesale whenever the corpus is reloaded; `sequence`
/// reflects insertion order within the parent document and is the final
/// tie-break for ranking, keeping results deterministic.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunk {
    /// Identifier of the document this chunk was cut from.
    pub document_id: String,
    /// 0-indexed position of this chunk within the document.
    pub sequence: usize,
    /// The chunk text as it appeared in the source (markdown preserved).
    pub text: String,
    /// The [`normalize`]d form of `text`, used for lexical matching.
    pub normalized_text: String,
}

/// Splits markdown documents into [`DocumentChunk`]s at structural
/// boundaries, capping each chunk at a maximum length.
pub struct SectionChunker {
    max_chunk_len: usize,
    heading: Regex,
    sentence_end: Regex,
}

impl Default for SectionChunker {
    fn default() -> Self {
        Self::new(1200)
    }
}

impl SectionChunker {
    /// Create a chunker with the given maximum chunk length in bytes.
    pub fn new(max_chunk_len: usize) -> Self {
        Self {
            max_chunk_len: max_chunk_len.max(1),
            heading: Regex::new(r"^\s*#{1,6}\s").unwrap(),
            sentence_end: Regex::new(r"[.!?]\s+").unwrap(),
        }
    }

    /// Split `raw_text` into chunks. Returns an empty Vec for documents with
    /// no retrievable content (the caller decides how to report that).
    pub fn chunk(&self, document_id: &str, raw_text: &str) -> Vec<DocumentChunk> {
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for block in self.split_blocks(raw_text) {
            let starts_section = self.heading.is_match(&block);
            let fits =
                current.is_empty() || current.len() + 2 + block.len() <= self.max_chunk_len;

            if !current.is_empty() && (starts_section || !fits) {
                pieces.push(std::mem::take(&mut current));
            }

            if block.len() > self.max_chunk_len {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                pieces.extend(self.split_oversized(&block));
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(&block);
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
            .into_iter()
            .filter_map(|text| {
                let normalized_text = normalize(&text);
                if normalized_text.is_empty() {
                    return None;
                }
                Some((text, normalized_text))
            })
            .enumerate()
            .map(|(sequence, (text, normalized_text))| DocumentChunk {
                document_id: document_id.to_string(),
                sequence,
                text,
                normalized_text,
            })
            .collect()
    }

    /// Split raw text into blocks: blank lines separate blocks, and a heading
    /// line always forms a block of its own.
    fn split_blocks(&self, raw_text: &str) -> Vec<String> {
        let mut blocks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw_text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    blocks.push(current.join("\n"));
                    current.clear();
                }
            } else if self.heading.is_match(line) {
                if !current.is_empty() {
                    blocks.push(current.join("\n"));
                    current.clear();
                }
                blocks.push(line.to_string());
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            blocks.push(current.join("\n"));
        }
        blocks
    }

    /// Break a block that exceeds the cap: sentence boundaries first, then
    /// line boundaries (tables, lists), then raw character boundaries.
    fn split_oversized(&self, block: &str) -> Vec<String> {
        let mut units: Vec<&str> = Vec::new();
        let mut last = 0;
        for m in self.sentence_end.find_iter(block) {
            units.push(&block[last..m.end()]);
            last = m.end();
        }
        if last < block.len() {
            units.push(&block[last..]);
        }

        let mut packed: Vec<String> = Vec::new();
        let mut current = String::new();
        for unit in units {
            if unit.len() > self.max_chunk_len {
                if !current.is_empty() {
                    packed.push(std::mem::take(&mut current));
                }
                packed.extend(self.split_long_unit(unit));
                continue;
            }
            if !current.is_empty() && current.len() + unit.len() > self.max_chunk_len {
                packed.push(std::mem::take(&mut current));
            }
            current.push_str(unit);
        }
        if !current.is_empty() {
            packed.push(current);
        }
        packed
            .into_iter()
            .map(|p| p.trim_end().to_string())
            .filter(|p| !p.trim().is_empty())
            .collect()
    }

    /// A unit with no sentence boundaries: pack whole lines, hard-splitting
    /// any single line that still exceeds the cap.
    fn split_long_unit(&self, unit: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut current = String::new();
        for line in unit.lines() {
            if !current.is_empty() && current.len() + 1 + line.len() > self.max_chunk_len {
                out.push(std::mem::take(&mut current));
            }
            if line.len() > self.max_chunk_len {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                out.extend(hard_split(line, self.max_chunk_len));
                continue;
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn hard_split(text: &str, max_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if !current.is_empty() && current.len() + ch.len_utf8() > max_len {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
