//! Embedding provider trait and the fastembed-backed implementation.
//!
//! The retrieval engine treats embedding generation as an injected
//! capability: anything implementing [`EmbeddingProvider`] can back the
//! semantic index, and tests substitute deterministic stubs. The production
//! implementation here runs a local ONNX model through fastembed, loading it
//! once per process and sharing it through a global cache.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of batch embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// One embedding per input text, in input order.
    pub embeddings: Vec<Vec<f16>>,
    /// Dimension of each embedding vector.
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Build a result, inferring the dimension from the first vector.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// A source of text embeddings.
///
/// Implementations must be cheap to share (`Send + Sync`); the engine holds
/// one behind an `Arc` and calls it from concurrent queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Embed a batch of texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of the vectors this provider produces.
    fn embedding_dimension(&self) -> usize;

    /// Short identifier for logging.
    fn provider_name(&self) -> &str;
}

type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Loaded models are cached per model name so repeated provider construction
/// (reloads, tests) does not re-initialize the ONNX runtime.
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Map a configured model name to a built-in fastembed model. Names outside
/// this table are a configuration error, never a silent substitution.
fn builtin_model(model_name: &str) -> Result<EmbeddingModel> {
    match model_name {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L6-v2-q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbedError::invalid_config(format!(
            "unsupported embedding model '{other}'"
        ))),
    }
}

/// FastEmbed-backed embedding provider running a local ONNX model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Create an uninitialized provider; call [`initialize`](Self::initialize)
    /// before embedding.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
            dimension: 384, // all-MiniLM-L6-v2
        }
    }

    /// Create and initialize a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Load the embedding model, reusing the process-wide cache when the
    /// same model was already loaded.
    pub async fn initialize(&mut self) -> Result<()> {
        tracing::info!("initializing embedding model: {}", self.config.model_name());
        let model_id = builtin_model(self.config.model_name())?;

        let cache_key = self.config.model_name().to_string();
        let cached = {
            let cache = model_cache().lock().unwrap();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };
        if let Some((model, dimension)) = cached {
            tracing::debug!("using cached embedding model: {cache_key}");
            self.model = Some(model);
            self.dimension = dimension;
            return Ok(());
        }

        // Model init is CPU- and IO-heavy; keep it off the async runtime.
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options =
                    InitOptions::new(model_id).with_show_download_progress(false);
                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))?;

                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(384);

                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        {
            let mut cache = model_cache().lock().unwrap();
            cache.insert(cache_key, (Arc::clone(&model), dimension));
        }

        tracing::info!("embedding model loaded, dimension {dimension}");
        self.model = Some(model);
        self.dimension = dimension;
        Ok(())
    }

    /// Drop all cached models.
    pub fn clear_cache() {
        model_cache().lock().unwrap().clear();
    }

    fn convert_to_f16(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let norm: f32 = if self.config.normalize {
                    embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
                } else {
                    1.0
                };
                let scale = if norm > 0.0 { 1.0 / norm } else { 1.0 };
                embedding
                    .into_iter()
                    .map(|x| f16::from_f32(x * scale))
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::unavailable("no embedding generated"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EmbedError::unavailable("model not initialized"))?;

        tracing::debug!("embedding {} texts", texts.len());

        let batch_size = 16;
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);
            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().unwrap();
                guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))
            })
            .await??;
            all_embeddings.extend(self.convert_to_f16(batch));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_result_infers_dimension() {
        let result = EmbeddingResult::new(vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::new(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.dimension, 0);
    }

    #[test]
    fn uninitialized_provider_reports_unavailable() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);

        let err = tokio_test::block_on(provider.embed_text("hello")).unwrap_err();
        assert!(matches!(err, EmbedError::Unavailable { .. }));
    }

    #[test]
    fn unknown_model_name_is_a_config_error() {
        let mut provider = FastEmbedProvider::new(EmbedConfig::new("mystery-model-3000"));
        let err = tokio_test::block_on(provider.initialize()).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));

        assert!(builtin_model("all-MiniLM-L6-v2").is_ok());
    }

    #[tokio::test]
    #[ignore] // Downloads the real model; run with: cargo test -- --ignored
    async fn real_model_embeds_and_normalizes() -> Result<()> {
        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        let embedding = provider.embed_text("local knowledge base search").await?;
        assert_eq!(embedding.len(), provider.embedding_dimension());

        // Normalized output: self-similarity is ~1.0.
        let self_sim: f32 = embedding
            .iter()
            .map(|x| x.to_f32() * x.to_f32())
            .sum::<f32>();
        assert!((self_sim - 1.0).abs() < 0.02);
        Ok(())
    }
}
