//! External model provider interfaces
//!
//! Every expensive capability the engine consumes (query embedding,
//! cross-encoder reranking, structured intent extraction) sits behind a
//! trait so deployments can swap backends and tests can inject mocks. All
//! calls are bounded by a per-call timeout; a timed-out or failed call is
//! reported as a `ProviderError` and absorbed by the calling stage, never
//! surfaced to the retrieve() caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

mod fastembed;

pub use fastembed::{FastEmbedProvider, FastEmbedReranker};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Provider returned malformed output: {0}")]
    Malformed(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider call failed: {0}")]
    Failed(String),
}

/// Whether a text is embedded as a search query or a catalog document.
/// Asymmetric embedding models score the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Query,
    Document,
}

/// Text embedding capability
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text; the returned vector must match `dimension()`
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Vec<f32>, ProviderError>;

    /// Embedding dimension produced by this provider
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Document handed to the rerank provider
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: u32,
    pub text: String,
}

/// Relevance-scored document returned by the rerank provider
#[derive(Debug, Clone)]
pub struct RerankedDocument {
    pub id: u32,
    pub score: f32,
}

/// Cross-encoder reranking capability
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Rerank documents against the query, returning up to `top_n` ids with
    /// relevance scores, best first
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
    ) -> Result<Vec<RerankedDocument>, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Partial intent produced by an external structured-extraction model.
/// Fields the model could not determine stay empty and the heuristic value
/// wins during the merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentOverlay {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub article_types: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub style_keywords: Vec<String>,
}

/// Structured intent extraction capability
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extract a partial intent from the query. `article_types` is the
    /// catalog vocabulary the model should constrain itself to.
    async fn extract(
        &self,
        query: &str,
        article_types: &[String],
    ) -> Result<IntentOverlay, ProviderError>;
}

/// Per-call timeout clamped to the remaining request budget; `None` when
/// the budget is already exhausted and the call should be skipped entirely.
pub fn remaining_timeout(
    request_timeout: Duration,
    deadline: Option<std::time::Instant>,
) -> Option<Duration> {
    match deadline {
        None => Some(request_timeout),
        Some(deadline) => {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            if remaining.is_zero() {
                None
            } else {
                Some(request_timeout.min(remaining))
            }
        }
    }
}

/// Run a provider call under a timeout, mapping elapsed time to
/// `ProviderError::Timeout`.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout { operation, timeout }),
    }
}
