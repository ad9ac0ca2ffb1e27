//! Exact and token-overlap matching over normalized chunk text.

use crate::retrieval::snapshot::{Candidate, RetrievalMethod};
use kbqa_context::content_tokens;
use std::collections::HashSet;

/// Scale applied to token-overlap scores so a fuzzy match can never tie an
/// exact substring match at 1.0.
const OVERLAP_SCALE: f32 = 0.99;

#[derive(Debug, Clone)]
struct KeywordEntry {
    chunk: usize,
    chunk_id: String,
    normalized: String,
    tokens: HashSet<String>,
    text_len: usize,
}

/// Keyword search tier. Scores an exact substring match at 1.0 and falls
/// back to Jaccard overlap of content tokens, scaled into (0, 1).
#[derive(Debug, Default)]
pub struct KeywordIndex {
    entries: Vec<KeywordEntry>,
}

impl KeywordIndex {
    /// Add a chunk. `chunk` is its position in the snapshot chunk table;
    /// insertion order is the final ranking tie-break.
    pub fn insert(&mut self, chunk: usize, chunk_id: &str, normalized: &str, text_len: usize) {
        let tokens = content_tokens(normalized)
            .into_iter()
            .map(str::to_string)
            .collect();
        self.entries.push(KeywordEntry {
            chunk,
            chunk_id: chunk_id.to_string(),
            normalized: normalized.to_string(),
            tokens,
            text_len,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Search with an already-normalized query. Results are sorted by score
    /// descending, then shorter chunk text, then insertion order, and
    /// truncated to `top_k`.
    pub fn search(&self, normalized_query: &str, min_token_overlap: usize, top_k: usize) -> Vec<Candidate> {
        if normalized_query.is_empty() {
            return Vec::new();
        }
        let query_tokens: HashSet<&str> = content_tokens(normalized_query).into_iter().collect();

        let mut scored: Vec<(f32, usize, &KeywordEntry)> = Vec::new();
        for (order, entry) in self.entries.iter().enumerate() {
            let score = if entry.normalized.contains(normalized_query) {
                1.0
            } else if query_tokens.is_empty() {
                continue;
            } else {
                let shared = query_tokens
                    .iter()
                    .filter(|t| entry.tokens.contains(**t))
                    .count();
                if shared < min_token_overlap.max(1) {
                    continue;
                }
                let union = query_tokens.len() + entry.tokens.len() - shared;
                if union == 0 {
                    continue;
                }
                (shared as f32 / union as f32) * OVERLAP_SCALE
            };
            scored.push((score, order, entry));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.text_len.cmp(&b.2.text_len))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, _, entry)| Candidate {
                chunk: entry.chunk,
                chunk_id: entry.chunk_id.clone(),
                score,
                method: RetrievalMethod::Keyword,
            })
            .collect()
    }
}
