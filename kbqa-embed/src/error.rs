//! Error types for the embedding collaborator.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors surfaced by embedding providers.
///
/// The variant retrieval code cares about is [`EmbedError::Unavailable`]: it
/// means the embedding collaborator (model, network, runtime) cannot serve
/// the request right now, and the query should degrade to keyword-only
/// retrieval rather than fail.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding collaborator cannot be reached or is not ready.
    #[error("embedding provider unavailable: {message}")]
    Unavailable { message: String },

    /// The provider configuration is invalid.
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// IO errors while loading model resources.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A blocking embedding task panicked or was cancelled.
    #[error("embedding task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Errors from the underlying embedding library.
    #[error("embedding backend error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// The collaborator is unreachable or not initialized.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// The provider configuration is invalid.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
