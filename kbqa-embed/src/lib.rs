//! # kbqa-embed
//!
//! Embedding abstraction for the kbqa retrieval engine. The engine never
//! talks to a model directly: it holds an [`EmbeddingProvider`] trait object,
//! injected at construction, so the model can be swapped or stubbed in
//! tests. The bundled [`FastEmbedProvider`] runs a local ONNX model through
//! fastembed with half-precision, L2-normalized output.
//!
//! Providers signal collaborator failure (model missing, runtime down) with
//! [`EmbedError::Unavailable`]; callers are expected to degrade to lexical
//! retrieval rather than fail the query.

pub mod config;
pub mod error;
pub mod provider;

pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
