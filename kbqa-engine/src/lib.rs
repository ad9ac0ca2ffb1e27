//! Hybrid question answering over a local markdown knowledge base.
//!
//! Queries are answered by two search tiers built over the same chunked
//! corpus: an exact/token-overlap keyword tier and a cosine-similarity
//! semantic tier. A threshold-gated ranker picks the winning candidate,
//! the formatter renders it as plain text, and every exchange is logged
//! to a SQLite analytics store off the request path.

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod retrieval;

pub use analytics::{AnalyticsSink, AnalyticsSummary, InteractionRecord};
pub use config::EngineConfig;
pub use engine::{MethodUsed, QueryEngine, QueryResult, SnapshotStats};
pub use error::{EngineError, Result};
