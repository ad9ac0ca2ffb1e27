//! Retrieval pipeline: corpus loading, index snapshots, the keyword and
//! semantic search tiers, candidate ranking, and response formatting.

pub mod corpus;
pub mod formatter;
pub mod keyword_index;
pub mod ranker;
pub mod semantic_index;
pub mod snapshot;
