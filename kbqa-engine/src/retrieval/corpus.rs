//! Document store: loads raw markdown documents for indexing.
//!
//! The engine consumes documents through the [`CorpusStore`] trait so the
//! storage behind the knowledge base stays swappable. [`DirectoryCorpus`]
//! is the production implementation (a flat directory of `*.md` files);
//! [`InMemoryCorpus`] backs tests and rebuild experiments.

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

/// A raw source document. Immutable once loaded; the whole set is replaced
/// on corpus reload.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier: the file stem (`pricing.md` -> `pricing`).
    pub id: String,
    /// Path the document was loaded from.
    pub path: PathBuf,
    /// Unmodified file content.
    pub raw_text: String,
}

/// Source of documents for index builds.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// List every document in the corpus. Called at initialization and on
    /// explicit reindex, never per query.
    async fn list_documents(&self) -> Result<Vec<Document>>;
}

/// Reads `*.md` documents from a single directory.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    root: PathBuf,
}

impl DirectoryCorpus {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl CorpusStore for DirectoryCorpus {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let is_markdown = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
            if !is_markdown || !entry.metadata().await?.is_file() {
                continue;
            }

            let raw_text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to read {}: {e}", path.display());
                    continue;
                }
            };
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            if raw_text.trim().is_empty() {
                let skipped = crate::error::EngineError::EmptyDocument { id };
                warn!("skipping {}: {skipped}", path.display());
                continue;
            }
            documents.push(Document { id, path, raw_text });
        }

        // Directory iteration order is platform-dependent; sort for
        // deterministic chunk insertion order.
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }
}

/// In-memory corpus whose document set can be replaced between reloads.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    documents: RwLock<Vec<Document>>,
}

impl InMemoryCorpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    /// Build a corpus from `(id, raw_text)` pairs.
    pub fn from_texts(texts: &[(&str, &str)]) -> Self {
        let documents = texts
            .iter()
            .map(|(id, raw_text)| Document {
                id: (*id).to_string(),
                path: PathBuf::from(format!("{id}.md")),
                raw_text: (*raw_text).to_string(),
            })
            .collect();
        Self::new(documents)
    }

    /// Replace the document set; takes effect at the next reload.
    pub fn set_documents(&self, documents: Vec<Document>) {
        *self.documents.write().unwrap() = documents;
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.documents.read().unwrap().clone())
    }
}
