//! Configuration for embedding providers.

use serde::{Deserialize, Serialize};

/// Configuration for a [`FastEmbedProvider`](crate::FastEmbedProvider).
///
/// Only the built-in fastembed models are supported; the default is
/// all-MiniLM-L6-v2, a small general-purpose sentence model whose 384
/// dimensions keep the in-memory index compact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedConfig {
    /// Name of the embedding model.
    pub model_name: String,
    /// Whether output vectors are L2-normalized (cosine similarity then
    /// reduces to a dot product).
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            normalize: true,
        }
    }
}

impl EmbedConfig {
    /// Create a config for the named model with normalization enabled.
    pub fn new<S: Into<String>>(model_name: S) -> Self {
        Self {
            model_name: model_name.into(),
            normalize: true,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}
