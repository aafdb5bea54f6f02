//! Retrieval engine: the single entry point tying the pipeline together
//!
//! One engine instance owns the catalog snapshot, both candidate
//! generators, the adaptive reranker, the rule engines, and the caches.
//! `retrieve()` dispatches on the request shape and always runs the same
//! stages: intent, parallel candidate generation, fusion, reranking, rules.

use crate::catalog::{CatalogIndex, Product};
use crate::config::Config;
use crate::error::{OutfitterError, Result};
use crate::intent::{Intent, IntentCache, IntentExtractor};
use crate::provider::{EmbeddingProvider, ExtractionProvider, RerankProvider};
use crate::query::normalize;
use crate::retrieval::rules::complement_hints;
use crate::retrieval::{
    reciprocal_rank_fusion, AdaptiveReranker, DenseGenerator, EmbeddingCache, FusedCandidate,
    LexicalGenerator, RankedRecommendation, RetrieveRequest, RuleContext, RuleEngine,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pool floor multiplier relating `top_k` to candidate generation depth
const POOL_PER_RESULT: usize = 20;
/// Rule pool floor for pairing requests
const PAIRING_POOL_FLOOR: usize = 24;
const PAIRING_POOL_PER_RESULT: usize = 8;

/// External providers wired into an engine. Every slot is optional; a
/// missing provider degrades the corresponding stage instead of failing
/// construction.
#[derive(Default)]
pub struct EngineProviders {
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub rerank: Option<Arc<dyn RerankProvider>>,
    pub extraction: Option<Arc<dyn ExtractionProvider>>,
}

/// Monotonic counters snapshot for the info surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub catalog_products: usize,
    pub embedding_dim: usize,
    pub searches: u64,
    pub pairings: u64,
    pub refinements: u64,
    pub intent_cache_entries: usize,
    pub intent_cache_hits: u64,
    pub intent_cache_misses: u64,
    pub embedding_cache_entries: usize,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
}

pub struct RetrievalEngine {
    catalog: Arc<CatalogIndex>,
    config: Config,
    lexical: Arc<LexicalGenerator>,
    dense: DenseGenerator,
    reranker: AdaptiveReranker,
    search_rules: RuleEngine,
    pairing_rules: RuleEngine,
    extractor: IntentExtractor,
    intent_cache: Arc<IntentCache>,
    embedding_cache: Arc<EmbeddingCache>,
    searches: AtomicU64,
    pairings: AtomicU64,
    refinements: AtomicU64,
}

impl RetrievalEngine {
    /// Build an engine over a loaded catalog. Fails when the embedding
    /// provider's dimension disagrees with the catalog embeddings; every
    /// other provider problem is absorbed at call time instead.
    pub fn new(config: Config, catalog: Arc<CatalogIndex>, providers: EngineProviders) -> Result<Self> {
        if let Some(embedding) = &providers.embedding {
            if !catalog.is_empty() && embedding.dimension() != catalog.embedding_dim() {
                return Err(OutfitterError::Config(format!(
                    "embedding model '{}' produces {}-dim vectors but the catalog stores {}-dim vectors",
                    embedding.model_name(),
                    embedding.dimension(),
                    catalog.embedding_dim()
                )));
            }
        }

        let request_timeout = Duration::from_millis(config.providers.request_timeout_ms);
        let intent_cache = Arc::new(IntentCache::new());
        let embedding_cache = Arc::new(EmbeddingCache::new(catalog.embedding_dim()));

        let lexical = Arc::new(LexicalGenerator::new(
            Arc::clone(&catalog),
            config.retrieval.min_token_len,
        ));
        let dense = DenseGenerator::new(
            Arc::clone(&catalog),
            providers.embedding.clone(),
            Arc::clone(&embedding_cache),
            request_timeout,
        );
        let reranker = AdaptiveReranker::new(
            Arc::clone(&catalog),
            providers.rerank.clone(),
            config.rerank.clone(),
            request_timeout,
        );
        let extractor = IntentExtractor::new(
            Arc::clone(&catalog),
            providers.extraction.clone(),
            Arc::clone(&intent_cache),
            config.intent.enrichment_threshold,
            request_timeout,
        );

        tracing::info!(
            products = catalog.len(),
            embedding_dim = catalog.embedding_dim(),
            dense = providers.embedding.is_some(),
            rerank = providers.rerank.is_some(),
            extraction = providers.extraction.is_some(),
            "retrieval engine ready"
        );

        Ok(Self {
            search_rules: RuleEngine::for_search(Arc::clone(&catalog)),
            pairing_rules: RuleEngine::for_pairing(Arc::clone(&catalog)),
            catalog,
            config,
            lexical,
            dense,
            reranker,
            extractor,
            intent_cache,
            embedding_cache,
            searches: AtomicU64::new(0),
            pairings: AtomicU64::new(0),
            refinements: AtomicU64::new(0),
        })
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            catalog_products: self.catalog.len(),
            embedding_dim: self.catalog.embedding_dim(),
            searches: self.searches.load(Ordering::Relaxed),
            pairings: self.pairings.load(Ordering::Relaxed),
            refinements: self.refinements.load(Ordering::Relaxed),
            intent_cache_entries: self.intent_cache.len(),
            intent_cache_hits: self.intent_cache.hits(),
            intent_cache_misses: self.intent_cache.misses(),
            embedding_cache_entries: self.embedding_cache.len(),
            embedding_cache_hits: self.embedding_cache.hits(),
            embedding_cache_misses: self.embedding_cache.misses(),
        }
    }

    /// Run one retrieval request end to end.
    ///
    /// An empty result is a valid outcome and is returned as an empty list.
    /// Provider degradation never surfaces here; only malformed requests
    /// produce errors.
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<Vec<RankedRecommendation>> {
        if request.top_k() == 0 {
            return Err(OutfitterError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }
        let deadline = Instant::now() + Duration::from_millis(self.config.providers.request_budget_ms);

        match request {
            RetrieveRequest::Search { query, vision, top_k } => {
                self.searches.fetch_add(1, Ordering::Relaxed);
                let normalized = normalize(&query);
                let text = match (normalized.is_empty(), &vision) {
                    (false, _) => normalized,
                    (true, Some(v)) => vision_fallback_text(v),
                    (true, None) => return Ok(Vec::new()),
                };
                if text.is_empty() {
                    return Ok(Vec::new());
                }
                let intent = self
                    .extractor
                    .extract(&text, vision.as_ref(), Some(deadline))
                    .await;
                self.search(&text, &intent, top_k, deadline).await
            }

            RetrieveRequest::Refine { query, intent, top_k } => {
                self.refinements.fetch_add(1, Ordering::Relaxed);
                let normalized = normalize(&query);
                if normalized.is_empty() && intent.populated_fields() == 0 {
                    return Ok(Vec::new());
                }
                self.search(&normalized, &intent, top_k, deadline).await
            }

            RetrieveRequest::CompleteTheLook { anchor_id, top_k } => {
                self.pairings.fetch_add(1, Ordering::Relaxed);
                let anchor = self.catalog.get(anchor_id).ok_or_else(|| {
                    OutfitterError::InvalidRequest(format!(
                        "anchor product {anchor_id} is not in the catalog"
                    ))
                })?;
                self.complete_the_look(anchor, top_k, deadline).await
            }
        }
    }

    async fn search(
        &self,
        text: &str,
        intent: &Intent,
        top_k: usize,
        deadline: Instant,
    ) -> Result<Vec<RankedRecommendation>> {
        let fused = self.generate_and_fuse(text, intent, top_k, deadline).await;
        if fused.is_empty() {
            tracing::debug!(query = text, "no candidates from either generator");
            return Ok(Vec::new());
        }

        let rule_pool = (top_k * self.config.retrieval.rule_pool_multiplier).max(top_k);
        let reranked = self
            .reranker
            .rerank(text, fused, intent, rule_pool, Some(deadline))
            .await;

        let ctx = RuleContext {
            intent,
            anchor: None,
            prefer_newest: self.config.rules.prefer_newest,
        };
        Ok(self.search_rules.apply(&reranked, &ctx, top_k))
    }

    async fn complete_the_look(
        &self,
        anchor: &Product,
        top_k: usize,
        deadline: Instant,
    ) -> Result<Vec<RankedRecommendation>> {
        let text = pairing_query(anchor);
        let intent = pairing_intent(anchor);

        let mut fused = self.generate_and_fuse(&text, &intent, top_k, deadline).await;
        fused.retain(|c| c.product_id != anchor.id);
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let rule_pool = (top_k * PAIRING_POOL_PER_RESULT).max(PAIRING_POOL_FLOOR);
        let reranked = self
            .reranker
            .rerank(&text, fused, &intent, rule_pool, Some(deadline))
            .await;

        let ctx = RuleContext {
            intent: &intent,
            anchor: Some(anchor),
            prefer_newest: self.config.rules.prefer_newest,
        };
        // Score a wide pool, diversify across article types, then cut
        let ranked = self.pairing_rules.apply(&reranked, &ctx, rule_pool);
        Ok(self.diversify(ranked, top_k))
    }

    async fn generate_and_fuse(
        &self,
        text: &str,
        intent: &Intent,
        top_k: usize,
        deadline: Instant,
    ) -> Vec<FusedCandidate> {
        let pool = self
            .config
            .retrieval
            .candidate_pool
            .max(top_k * POOL_PER_RESULT);

        // Lexical scoring is CPU-bound with no await points; it goes to the
        // blocking pool so the dense provider call overlaps it
        let lexical_task = {
            let lexical = Arc::clone(&self.lexical);
            let intent = intent.clone();
            let text = text.to_string();
            tokio::task::spawn_blocking(move || lexical.generate(&intent, &text, pool))
        };
        let (lexical, dense) = tokio::join!(
            lexical_task,
            self.dense.generate(text, pool, Some(deadline)),
        );
        let lexical = lexical.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Lexical scoring task failed");
            Vec::new()
        });
        tracing::debug!(
            lexical = lexical.len(),
            dense = dense.len(),
            pool,
            "candidate generation complete"
        );

        reciprocal_rank_fusion(&lexical, &dense, self.config.fusion.rrf_k)
    }

    /// Round-robin over article types so pairing results span the outfit
    /// instead of repeating the single best-scoring type.
    fn diversify(
        &self,
        ranked: Vec<RankedRecommendation>,
        top_k: usize,
    ) -> Vec<RankedRecommendation> {
        let mut remaining: Vec<Option<RankedRecommendation>> =
            ranked.into_iter().map(Some).collect();
        let mut picked: Vec<RankedRecommendation> = Vec::with_capacity(top_k);

        while picked.len() < top_k && remaining.iter().any(Option::is_some) {
            let mut seen_types: Vec<String> = Vec::new();
            for slot in remaining.iter_mut() {
                if picked.len() >= top_k {
                    break;
                }
                let Some(item) = slot else { continue };
                let article = self
                    .catalog
                    .get(item.product_id)
                    .map(|p| p.article_type.to_ascii_lowercase())
                    .unwrap_or_default();
                if seen_types.contains(&article) {
                    continue;
                }
                seen_types.push(article);
                if let Some(item) = slot.take() {
                    picked.push(item);
                }
            }
        }

        for (i, item) in picked.iter_mut().enumerate() {
            item.rank = i + 1;
        }
        picked
    }
}

/// Query text for a pairing request, synthesized from the anchor's
/// attributes and its complement vocabulary.
fn pairing_query(anchor: &Product) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(anchor.gender.clone());
    parts.push(anchor.usage.clone());
    match complement_hints(&anchor.article_type) {
        Some(hints) => parts.push(hints.to_string()),
        None => parts.push(anchor.sub_category.clone()),
    }
    parts.push(anchor.base_colour.clone());
    normalize(&parts.join(" "))
}

/// Intent seed for a pairing request: the anchor's gender and occasion,
/// deliberately without its article type so candidates span other pieces.
fn pairing_intent(anchor: &Product) -> Intent {
    Intent {
        gender: Some(anchor.gender.clone()),
        usages: vec![anchor.usage.clone()],
        ..Default::default()
    }
}

/// When the typed query normalizes to nothing but a vision summary exists,
/// search on what the vision provider saw.
fn vision_fallback_text(vision: &crate::intent::VisionSummary) -> String {
    if let Some(query) = vision.search_queries.first() {
        let normalized = normalize(query);
        if !normalized.is_empty() {
            return normalized;
        }
    }
    let mut parts: Vec<&str> = Vec::new();
    if let Some(gender) = &vision.gender {
        parts.push(gender);
    }
    parts.extend(vision.colors.iter().map(String::as_str));
    parts.extend(vision.article_types.iter().map(String::as_str));
    normalize(&parts.join(" "))
}
