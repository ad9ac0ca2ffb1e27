//! Immutable index snapshots.
//!
//! A snapshot holds everything a query needs: the chunk table, document
//! metadata, and both search tiers. The engine swaps a new `Arc<IndexSnapshot>`
//! in atomically on reload, so readers always see a complete index.

use crate::error::EngineError;
use crate::retrieval::corpus::Document;
use crate::retrieval::keyword_index::KeywordIndex;
use crate::retrieval::semantic_index::SemanticIndex;
use half::f16;
use kbqa_context::SectionChunker;
use kbqa_embed::EmbeddingProvider;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which search tier produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Keyword,
    Semantic,
}

/// A scored chunk reference produced by one search tier.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index into the snapshot's chunk table.
    pub chunk: usize,
    pub chunk_id: String,
    pub score: f32,
    pub method: RetrievalMethod,
}

/// An indexed chunk with both text forms and an optional embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// `{document_id}#{sequence}`.
    pub id: String,
    pub document_id: String,
    pub sequence: usize,
    pub text: String,
    pub normalized_text: String,
    /// Absent when the embedding provider was unavailable at build time.
    pub embedding: Option<Vec<f16>>,
}

/// A complete, immutable index over one corpus revision.
pub struct IndexSnapshot {
    documents: HashMap<String, Document>,
    chunks: Vec<Chunk>,
    keyword: KeywordIndex,
    semantic: SemanticIndex,
    generation: u64,
}

impl IndexSnapshot {
    /// An empty snapshot, used before the first build completes.
    pub fn empty() -> Self {
        Self {
            documents: HashMap::new(),
            chunks: Vec::new(),
            keyword: KeywordIndex::default(),
            semantic: SemanticIndex::default(),
            generation: 0,
        }
    }

    /// Chunk documents and build both search tiers. Documents that produce
    /// no chunks are skipped with a warning. An embedding failure degrades
    /// the snapshot to keyword-only rather than failing the build.
    pub async fn build(
        documents: Vec<Document>,
        chunker: &SectionChunker,
        provider: Option<&dyn EmbeddingProvider>,
        generation: u64,
    ) -> Self {
        let mut document_map = HashMap::new();
        let mut chunks: Vec<Chunk> = Vec::new();

        for document in documents {
            let pieces = chunker.chunk(&document.id, &document.raw_text);
            if pieces.is_empty() {
                let skipped = EngineError::EmptyDocument {
                    id: document.id.clone(),
                };
                warn!("skipping document: {skipped}");
                continue;
            }
            for piece in pieces {
                chunks.push(Chunk {
                    id: format!("{}#{}", piece.document_id, piece.sequence),
                    document_id: piece.document_id,
                    sequence: piece.sequence,
                    text: piece.text,
                    normalized_text: piece.normalized_text,
                    embedding: None,
                });
            }
            document_map.insert(document.id.clone(), document);
        }

        if let Some(provider) = provider {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            match provider.embed_texts(&texts).await {
                Ok(result) => {
                    for (chunk, embedding) in chunks.iter_mut().zip(result.embeddings) {
                        chunk.embedding = Some(embedding);
                    }
                }
                Err(e) => {
                    warn!("embedding failed, snapshot will serve keyword-only: {e}");
                }
            }
        }

        let mut keyword = KeywordIndex::default();
        let mut semantic = SemanticIndex::default();
        for (i, chunk) in chunks.iter().enumerate() {
            keyword.insert(i, &chunk.id, &chunk.normalized_text, chunk.text.len());
            if let Some(embedding) = &chunk.embedding {
                semantic.insert(i, &chunk.id, embedding.clone());
            }
        }

        debug!(
            generation,
            documents = document_map.len(),
            chunks = chunks.len(),
            embedded = semantic.len(),
            "built index snapshot"
        );

        Self {
            documents: document_map,
            chunks,
            keyword,
            semantic,
            generation,
        }
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn document_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn keyword(&self) -> &KeywordIndex {
        &self.keyword
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    /// True when no chunk carries an embedding.
    pub fn keyword_only(&self) -> bool {
        self.semantic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::corpus::InMemoryCorpus;
    use crate::retrieval::corpus::CorpusStore;

    #[tokio::test]
    async fn build_without_provider_is_keyword_only() -> anyhow::Result<()> {
        let corpus = InMemoryCorpus::from_texts(&[
            ("faq", "# FAQ\n\nHow do I reset my password?\n\nOpen settings."),
            ("pricing", "# Pricing\n\n| Plan | Price |\n|------|-------|\n| Pro | $20 |"),
        ]);
        let documents = corpus.list_documents().await?;
        let snapshot =
            IndexSnapshot::build(documents, &SectionChunker::default(), None, 1).await;

        assert_eq!(snapshot.document_count(), 2);
        assert!(snapshot.chunk_count() >= 2);
        assert!(snapshot.keyword_only());
        assert_eq!(snapshot.keyword().len(), snapshot.chunk_count());
        assert_eq!(snapshot.generation(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn chunk_ids_carry_document_and_sequence() -> anyhow::Result<()> {
        let corpus = InMemoryCorpus::from_texts(&[("guide", "First part.\n\nSecond part.")]);
        let documents = corpus.list_documents().await?;
        let snapshot =
            IndexSnapshot::build(documents, &SectionChunker::default(), None, 1).await;

        let chunk = snapshot.chunk(0).unwrap();
        assert_eq!(chunk.id, format!("guide#{}", chunk.sequence));
        assert_eq!(chunk.document_id, "guide");
        Ok(())
    }

    #[tokio::test]
    async fn documents_without_retrievable_chunks_are_skipped() -> anyhow::Result<()> {
        // Punctuation-only content normalizes to nothing and yields no chunks.
        let corpus = InMemoryCorpus::from_texts(&[("noise", "---\n\n***\n"), ("real", "content")]);
        let documents = corpus.list_documents().await?;
        let snapshot =
            IndexSnapshot::build(documents, &SectionChunker::default(), None, 1).await;

        assert_eq!(snapshot.document_count(), 1);
        assert!(snapshot.document("noise").is_none());
        assert!(snapshot.document("real").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn empty_snapshot_serves_nothing() {
        let snapshot = IndexSnapshot::empty();
        assert_eq!(snapshot.chunk_count(), 0);
        assert!(snapshot.keyword().search("anything", 1, 5).is_empty());
    }
}
