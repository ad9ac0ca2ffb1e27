//! Error taxonomy for the retrieval engine.
//!
//! Nothing in the query path propagates an error to the caller:
//! [`QueryEngine::answer`](crate::engine::QueryEngine::answer) always
//! returns a `QueryResult`, even an empty one. The variants here cover the
//! indexing and analytics paths, where degraded-but-serving is the rule:
//! an empty document is skipped, an unavailable embedding collaborator
//! drops the semantic tier, and a failed rebuild leaves the prior snapshot
//! serving.

use kbqa_embed::EmbedError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A document produced zero retrievable chunks; it is skipped during
    /// indexing, never fatal to the pipeline.
    #[error("document '{id}' produced no retrievable chunks")]
    EmptyDocument { id: String },

    /// The embedding collaborator failed; queries proceed keyword-only.
    #[error("embedding unavailable: {source}")]
    EmbeddingUnavailable {
        #[from]
        source: EmbedError,
    },

    /// A snapshot rebuild failed. Fatal to the rebuild attempt only: the
    /// previously built snapshot keeps serving queries.
    #[error("index rebuild failed: {message}")]
    IndexRebuildFailure { message: String },

    /// The analytics sink rejected an operation. Logged by callers on the
    /// query path, never raised back into it.
    #[error("analytics error: {source}")]
    Analytics {
        #[from]
        source: sqlx::Error,
    },

    /// IO errors while reading the corpus.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn rebuild<S: Into<String>>(message: S) -> Self {
        Self::IndexRebuildFailure {
            message: message.into(),
        }
    }
}
