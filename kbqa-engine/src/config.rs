//! Engine configuration.
//!
//! Retrieval thresholds are deployment tuning knobs, not constants: they can
//! be set programmatically with the builder methods or loaded from a TOML
//! file. Defaults follow the documented policy (keyword tier at 0.6, semantic
//! tier at 0.5 cosine).

use crate::retrieval::ranker::RankingPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_keyword_threshold() -> f32 {
    0.6
}
fn default_semantic_threshold() -> f32 {
    0.5
}
fn default_top_k() -> usize {
    5
}
fn default_min_token_overlap() -> usize {
    1
}
fn default_max_chunk_len() -> usize {
    1200
}
fn default_embed_timeout_secs() -> u64 {
    5
}
fn default_analytics_db() -> PathBuf {
    PathBuf::from("analytics.db")
}

/// Configuration for a [`QueryEngine`](crate::engine::QueryEngine).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the markdown knowledge base.
    pub corpus_dir: PathBuf,
    /// Minimum keyword score for the lexical tier to win outright.
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: f32,
    /// Minimum cosine similarity for the semantic fallback tier.
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    /// Candidates retained per tier before ranking.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Shared non-stopword tokens required for a keyword candidate.
    #[serde(default = "default_min_token_overlap")]
    pub min_token_overlap: usize,
    /// Maximum chunk length in bytes.
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,
    /// Per-query budget for the embedding collaborator call; on expiry the
    /// query degrades to keyword-only.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    /// Location of the analytics SQLite database (used by the CLI).
    #[serde(default = "default_analytics_db")]
    pub analytics_db: PathBuf,
}

impl EngineConfig {
    /// Create a configuration with default thresholds for the given corpus
    /// directory.
    pub fn new<P: Into<PathBuf>>(corpus_dir: P) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            keyword_threshold: default_keyword_threshold(),
            semantic_threshold: default_semantic_threshold(),
            top_k: default_top_k(),
            min_token_overlap: default_min_token_overlap(),
            max_chunk_len: default_max_chunk_len(),
            embed_timeout_secs: default_embed_timeout_secs(),
            analytics_db: default_analytics_db(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn with_keyword_threshold(mut self, threshold: f32) -> Self {
        self.keyword_threshold = threshold;
        self
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_token_overlap(mut self, min_token_overlap: usize) -> Self {
        self.min_token_overlap = min_token_overlap;
        self
    }

    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn ranking_policy(&self) -> RankingPolicy {
        RankingPolicy {
            keyword_threshold: self.keyword_threshold,
            semantic_threshold: self.semantic_threshold,
        }
    }
}
