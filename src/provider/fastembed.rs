//! Local fastembed-backed providers
//!
//! Offline implementations of the embedding and rerank capabilities. Model
//! inference is synchronous ONNX execution, so calls are moved onto the
//! blocking thread pool to keep the retrieval pipeline responsive.

use super::{
    EmbeddingKind, EmbeddingProvider, ProviderError, RerankDocument, RerankProvider,
    RerankedDocument,
};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};
use std::sync::Arc;

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on-demand to `~/.cache/huggingface/` on first use.
/// all-MiniLM-L6-v2 (~90MB, 384 dims) is the recommended default.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, ProviderError> {
        let embedding_model = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(ProviderError::Unavailable(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        let dimension = match embedding_model {
            EmbeddingModel::BGEBaseENV15 => 768,
            _ => 384,
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, downloaded if not cached)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn with_default_model() -> Result<Self, ProviderError> {
        Self::new("all-MiniLM-L6-v2")
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str, _kind: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
        if text.is_empty() {
            return Err(ProviderError::Malformed("Empty text".to_string()));
        }

        // MiniLM/BGE are symmetric models; queries and documents share one
        // space, so the embedding kind carries no prefix here.
        let text = text.to_string();
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?
            .map_err(|e| ProviderError::Failed(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("No embeddings generated".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(ProviderError::Malformed(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Cross-encoder reranker backed by fastembed
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    pub fn new(model_name: &str) -> Result<Self, ProviderError> {
        let reranker_model = match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => {
                return Err(ProviderError::Unavailable(format!(
                    "Unsupported reranker: {}. Supported: bge-reranker-base, jina-reranker-v1-turbo-en",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing reranker model: {} (downloaded if not cached)",
            model_name
        );

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    pub fn with_default_model() -> Result<Self, ProviderError> {
        Self::new("bge-reranker-base")
    }
}

#[async_trait]
impl RerankProvider for FastEmbedReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
    ) -> Result<Vec<RerankedDocument>, ProviderError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        if query.is_empty() {
            return Err(ProviderError::Malformed("Query cannot be empty".to_string()));
        }

        let ids: Vec<u32> = documents.iter().map(|d| d.id).collect();
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let query = query.to_string();

        let model = Arc::clone(&self.model);
        let results = tokio::task::spawn_blocking(move || {
            let refs: Vec<&String> = texts.iter().collect();
            model.rerank(&query, refs, true, Some(top_n))
        })
        .await
        .map_err(|e| ProviderError::Failed(e.to_string()))?
        .map_err(|e| ProviderError::Failed(e.to_string()))?;

        let mut scored: Vec<RerankedDocument> = results
            .into_iter()
            .filter_map(|r| {
                ids.get(r.index).map(|&id| RerankedDocument {
                    id,
                    score: r.score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
