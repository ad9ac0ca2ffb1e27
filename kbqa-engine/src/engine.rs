//! Query engine: ties the corpus, the two search tiers, ranking, formatting
//! and analytics together behind a single `answer` entry point.

use crate::analytics::{AnalyticsSink, InteractionRecord};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::retrieval::corpus::CorpusStore;
use crate::retrieval::formatter::ResponseFormatter;
use crate::retrieval::ranker;
use crate::retrieval::snapshot::{Candidate, IndexSnapshot, RetrievalMethod};
use half::f16;
use kbqa_context::{normalize, SectionChunker};
use kbqa_embed::EmbeddingProvider;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Which tier, if any, produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodUsed {
    Keyword,
    Semantic,
    None,
}

impl From<RetrievalMethod> for MethodUsed {
    fn from(method: RetrievalMethod) -> Self {
        match method {
            RetrievalMethod::Keyword => MethodUsed::Keyword,
            RetrievalMethod::Semantic => MethodUsed::Semantic,
        }
    }
}

/// The answer returned to callers. Serialized field names match the wire
/// contract expected by clients.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    #[serde(rename = "response")]
    pub answer_text: String,
    #[serde(rename = "source")]
    pub source_document_id: Option<String>,
    pub confidence: f32,
    pub method_used: MethodUsed,
}

/// Counts describing the currently served snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SnapshotStats {
    pub generation: u64,
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

/// The retrieval engine. Clone-free; share it behind an `Arc`.
pub struct QueryEngine {
    config: EngineConfig,
    corpus: Arc<dyn CorpusStore>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: SectionChunker,
    formatter: ResponseFormatter,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    analytics: Option<AnalyticsSink>,
    /// Detached analytics writes still in flight; drained by `shutdown`
    /// before the pool closes so recorded interactions are never lost.
    record_tasks: Mutex<JoinSet<()>>,
    generation: AtomicU64,
}

impl QueryEngine {
    pub fn new(
        config: EngineConfig,
        corpus: Arc<dyn CorpusStore>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        analytics: Option<AnalyticsSink>,
    ) -> Self {
        let chunker = SectionChunker::new(config.max_chunk_len);
        Self {
            config,
            corpus,
            provider,
            chunker,
            formatter: ResponseFormatter::new(),
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
            analytics,
            record_tasks: Mutex::new(JoinSet::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Build the first snapshot. Queries before this completes are served
    /// from an empty index.
    pub async fn initialize(&self) -> Result<()> {
        self.reload().await
    }

    /// Rebuild the index from the corpus and swap it in. The swap is a
    /// single pointer replacement under a brief write lock, so concurrent
    /// queries see either the old snapshot or the new one, never a partial
    /// index. On failure the previous snapshot keeps serving.
    pub async fn reload(&self) -> Result<()> {
        let documents = self
            .corpus
            .list_documents()
            .await
            .map_err(|e| EngineError::rebuild(format!("corpus listing failed: {e}")))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(
            IndexSnapshot::build(
                documents,
                &self.chunker,
                self.provider.as_deref(),
                generation,
            )
            .await,
        );

        info!(
            generation,
            documents = snapshot.document_count(),
            chunks = snapshot.chunk_count(),
            keyword_only = snapshot.keyword_only(),
            "index snapshot ready"
        );

        *self.snapshot.write().await = snapshot;
        Ok(())
    }

    /// Flush analytics and release resources: every in-flight interaction
    /// write is awaited before the pool closes, so answers recorded just
    /// before shutdown still land.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.record_tasks.lock().unwrap());
        while tasks.join_next().await.is_some() {}

        if let Some(analytics) = &self.analytics {
            analytics.close().await;
        }
    }

    pub async fn snapshot_stats(&self) -> SnapshotStats {
        let snapshot = self.snapshot.read().await.clone();
        SnapshotStats {
            generation: snapshot.generation(),
            documents: snapshot.document_count(),
            chunks: snapshot.chunk_count(),
            embedded_chunks: snapshot.semantic().len(),
        }
    }

    pub fn analytics(&self) -> Option<&AnalyticsSink> {
        self.analytics.as_ref()
    }

    /// Answer one question. Never fails: retrieval misses, embedding
    /// timeouts and analytics errors all degrade rather than surface.
    pub async fn answer(&self, query_text: &str, session_id: &str) -> QueryResult {
        let started = Instant::now();
        let snapshot = self.snapshot.read().await.clone();

        let result = if let Some(small) = smalltalk_response(query_text) {
            QueryResult {
                answer_text: small,
                source_document_id: None,
                confidence: 1.0,
                method_used: MethodUsed::None,
            }
        } else {
            self.retrieve(&snapshot, query_text).await
        };

        self.record_interaction(
            query_text,
            session_id,
            started.elapsed().as_secs_f64(),
            result.source_document_id.clone(),
        );
        result
    }

    async fn retrieve(&self, snapshot: &IndexSnapshot, query_text: &str) -> QueryResult {
        let normalized = normalize(query_text);
        let policy = self.config.ranking_policy();

        let keyword_task = async {
            snapshot
                .keyword()
                .search(&normalized, self.config.min_token_overlap, self.config.top_k)
        };
        let semantic_task = self.semantic_candidates(snapshot, query_text);
        let (keyword, semantic) = tokio::join!(keyword_task, semantic_task);

        debug!(
            keyword_candidates = keyword.len(),
            semantic_candidates = semantic.len(),
            "retrieval tiers finished"
        );

        let winner = ranker::rank(&keyword, &semantic, policy)
            .and_then(|winner| snapshot.chunk(winner.chunk).map(|chunk| (winner, chunk)));

        match winner {
            Some((winner, chunk)) => {
                QueryResult {
                    answer_text: self.formatter.format(chunk),
                    source_document_id: Some(chunk.document_id.clone()),
                    confidence: winner.score,
                    method_used: winner.method.into(),
                }
            }
            None => {
                let topics = near_miss_topics(snapshot, &keyword, &semantic);
                QueryResult {
                    answer_text: self.formatter.no_match(&topics),
                    source_document_id: None,
                    confidence: 0.0,
                    method_used: MethodUsed::None,
                }
            }
        }
    }

    /// Embed the query and search the semantic tier. The embed call runs
    /// under a timeout; on expiry or provider failure the tier contributes
    /// nothing and the query proceeds keyword-only.
    async fn semantic_candidates(
        &self,
        snapshot: &IndexSnapshot,
        query_text: &str,
    ) -> Vec<Candidate> {
        let Some(provider) = &self.provider else {
            return Vec::new();
        };
        if snapshot.semantic().is_empty() {
            return Vec::new();
        }

        let embedding: Vec<f16> =
            match tokio::time::timeout(self.config.embed_timeout(), provider.embed_text(query_text))
                .await
            {
                Ok(Ok(embedding)) => embedding,
                Ok(Err(e)) => {
                    warn!("query embedding failed, serving keyword-only: {e}");
                    return Vec::new();
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.config.embed_timeout_secs,
                        "query embedding timed out, serving keyword-only"
                    );
                    return Vec::new();
                }
            };

        snapshot.semantic().search(&embedding, self.config.top_k)
    }

    /// Fire-and-forget analytics write. Failures are logged, never raised.
    fn record_interaction(
        &self,
        query_text: &str,
        session_id: &str,
        response_time_seconds: f64,
        source_document_id: Option<String>,
    ) {
        let Some(analytics) = self.analytics.clone() else {
            return;
        };
        let record = InteractionRecord::new(
            session_id,
            query_text,
            response_time_seconds,
            source_document_id,
        );
        let mut tasks = self.record_tasks.lock().unwrap();
        // Reap completed writes so the set does not grow with every query.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = analytics.record(&record).await {
                warn!("failed to record interaction: {e}");
            }
        });
    }
}

/// Document ids of the strongest below-threshold candidates, deduplicated
/// and ordered by score.
fn near_miss_topics(
    snapshot: &IndexSnapshot,
    keyword: &[Candidate],
    semantic: &[Candidate],
) -> Vec<String> {
    let mut merged: Vec<&Candidate> = keyword.iter().chain(semantic.iter()).collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut topics: Vec<String> = Vec::new();
    for candidate in merged {
        if candidate.score <= 0.0 {
            continue;
        }
        if let Some(chunk) = snapshot.chunk(candidate.chunk) {
            if !topics.contains(&chunk.document_id) {
                topics.push(chunk.document_id.clone());
            }
        }
        if topics.len() == 3 {
            break;
        }
    }
    topics
}

/// Canned replies for greetings and meta questions. These never hit the
/// index and report no source document.
fn smalltalk_response(query_text: &str) -> Option<String> {
    let lower = query_text.trim().to_lowercase();
    let lower = lower.trim_end_matches(['!', '.', '?']);

    const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon"];
    const GOODBYES: &[&str] = &["bye", "goodbye", "see you", "thanks, bye"];

    if GREETINGS.contains(&lower) {
        return Some(
            "Hello! Ask me anything about the product and I'll look it up in the \
             knowledge base."
                .to_string(),
        );
    }
    if GOODBYES.contains(&lower) {
        return Some("Goodbye! Come back any time you have more questions.".to_string());
    }
    if lower == "help" || lower == "what can you do" {
        return Some(
            "I answer questions from the product knowledge base. Try asking about \
             pricing, setup, integrations, or troubleshooting."
                .to_string(),
        );
    }
    None
}
