//! Cosine-similarity search over chunk embeddings.

use crate::retrieval::snapshot::{Candidate, RetrievalMethod};
use half::f16;

#[derive(Debug, Clone)]
struct SemanticEntry {
    chunk: usize,
    chunk_id: String,
    embedding: Vec<f16>,
}

/// Semantic search tier. Empty when embeddings were unavailable at build
/// time, in which case the engine serves keyword-only results.
#[derive(Debug, Default)]
pub struct SemanticIndex {
    entries: Vec<SemanticEntry>,
}

impl SemanticIndex {
    pub fn insert(&mut self, chunk: usize, chunk_id: &str, embedding: Vec<f16>) {
        self.entries.push(SemanticEntry {
            chunk,
            chunk_id: chunk_id.to_string(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank all chunks by cosine similarity to `query_embedding`, descending,
    /// truncated to `top_k`. Ties keep insertion order.
    pub fn search(&self, query_embedding: &[f16], top_k: usize) -> Vec<Candidate> {
        let mut scored: Vec<(f32, usize, &SemanticEntry)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(order, entry)| {
                (
                    cosine_similarity(query_embedding, &entry.embedding),
                    order,
                    entry,
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, _, entry)| Candidate {
                chunk: entry.chunk,
                chunk_id: entry.chunk_id.clone(),
                score,
                method: RetrievalMethod::Semantic,
            })
            .collect()
    }
}

/// Cosine similarity of two f16 vectors, computed in f32. Returns 0.0 for
/// mismatched dimensions or zero-norm inputs.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
