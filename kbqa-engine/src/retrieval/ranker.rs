//! Threshold-gated ranking across the two search tiers.
//!
//! The keyword tier is authoritative: if any keyword candidate clears its
//! threshold the best one wins outright, regardless of semantic scores.
//! Only then is the semantic tier consulted against its own threshold.

use crate::retrieval::snapshot::Candidate;

/// Acceptance thresholds for each tier.
#[derive(Debug, Clone, Copy)]
pub struct RankingPolicy {
    pub keyword_threshold: f32,
    pub semantic_threshold: f32,
}

/// Pick the winning candidate, or `None` when neither tier clears its
/// threshold. Candidate lists are assumed sorted by their tier's ordering;
/// a strictly-greater fold keeps the earliest of tied scores, preserving
/// each tier's tie-breaks.
pub fn rank<'a>(
    keyword: &'a [Candidate],
    semantic: &'a [Candidate],
    policy: RankingPolicy,
) -> Option<&'a Candidate> {
    best_above(keyword, policy.keyword_threshold)
        .or_else(|| best_above(semantic, policy.semantic_threshold))
}

fn best_above(candidates: &[Candidate], threshold: f32) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.score >= threshold)
        .fold(None, |best: Option<&Candidate>, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
}
