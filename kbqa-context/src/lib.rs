//! Text segmentation and normalization for the kbqa knowledge base.
//!
//! This crate turns raw markdown documents into retrievable units ("chunks")
//! and provides the normalization used for lexical matching. It is pure: no
//! I/O, no shared state, deterministic output for a given input.

pub mod text;

pub use text::{DocumentChunk, SectionChunker, content_tokens, is_stopword, normalize};
