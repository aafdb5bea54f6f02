//! Adaptive cross-encoder reranking
//!
//! The rerank provider call is the most expensive stage in the pipeline, so
//! it is invoked selectively: unambiguous queries whose fused ordering is
//! already well separated skip it entirely, and when it does run the
//! candidate pool is sized inversely to query signal strength, up to a fixed
//! ceiling. Provider failure or timeout returns the fused order unchanged;
//! this stage never raises.

use crate::catalog::CatalogIndex;
use crate::config::RerankConfig;
use crate::intent::Intent;
use crate::provider::{remaining_timeout, with_timeout, RerankDocument, RerankProvider};
use crate::retrieval::FusedCandidate;
use ahash::AHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How far into the fused list score spread is measured
const SPREAD_WINDOW: usize = 10;

pub struct AdaptiveReranker {
    catalog: Arc<CatalogIndex>,
    provider: Option<Arc<dyn RerankProvider>>,
    config: RerankConfig,
    request_timeout: Duration,
}

impl AdaptiveReranker {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        provider: Option<Arc<dyn RerankProvider>>,
        config: RerankConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            provider,
            config,
            request_timeout,
        }
    }

    /// Decide whether to invoke the external reranker and apply it.
    ///
    /// Skip path: fused order truncated to `top_n`. Rerank path: the head of
    /// the list (adaptively sized pool) reordered by provider relevance
    /// scores, untouched tail appended after. Degradation path: fused order
    /// unchanged.
    pub async fn rerank(
        &self,
        query_text: &str,
        fused: Vec<FusedCandidate>,
        intent: &Intent,
        top_n: usize,
        deadline: Option<Instant>,
    ) -> Vec<FusedCandidate> {
        if fused.len() < 2 {
            return fused;
        }

        let strength = self.signal_strength(intent, &fused);
        if !self.config.enabled || self.provider.is_none() {
            let mut fused = fused;
            fused.truncate(top_n.max(1));
            return fused;
        }

        if strength.is_strong {
            tracing::debug!(
                fields = strength.fields,
                spread = strength.spread,
                "strong query signal; skipping rerank call"
            );
            let mut fused = fused;
            fused.truncate(top_n.max(1));
            return fused;
        }

        let depth = self.adaptive_depth(&strength, top_n, fused.len());
        match self.call_provider(query_text, &fused[..depth], deadline).await {
            Some(reordered) => {
                tracing::debug!(depth, "rerank applied");
                let mut result = reordered;
                result.extend_from_slice(&fused[depth..]);
                result
            }
            None => {
                tracing::warn!("Rerank unavailable; keeping fused order");
                fused
            }
        }
    }

    /// Pool depth scales inversely with signal strength: weaker signal means
    /// a deeper pool, clamped to [top_n, max_depth] and the list length
    fn adaptive_depth(&self, strength: &SignalStrength, top_n: usize, available: usize) -> usize {
        let floor = top_n.max(1);
        let ceiling = self.config.max_depth.max(floor);
        let span = ceiling.saturating_sub(floor);
        let weakness = 1.0 - strength.score;
        let depth = floor + (span as f32 * weakness).ceil() as usize;
        depth.min(ceiling).min(available)
    }

    fn signal_strength(&self, intent: &Intent, fused: &[FusedCandidate]) -> SignalStrength {
        let fields = intent.populated_fields();
        let field_score =
            (fields as f32 / self.config.strong_signal_fields.max(1) as f32).min(1.0);

        let window = fused.len().min(SPREAD_WINDOW);
        let top = fused[0].fused_score;
        let tail = fused[window - 1].fused_score;
        let spread = if top > 0.0 { (top - tail) / top } else { 0.0 };
        let spread_score = if self.config.min_score_spread > 0.0 {
            (spread / self.config.min_score_spread).min(1.0)
        } else {
            1.0
        };

        SignalStrength {
            fields,
            spread,
            score: 0.5 * field_score + 0.5 * spread_score,
            is_strong: fields >= self.config.strong_signal_fields
                && spread >= self.config.min_score_spread,
        }
    }

    async fn call_provider(
        &self,
        query_text: &str,
        head: &[FusedCandidate],
        deadline: Option<Instant>,
    ) -> Option<Vec<FusedCandidate>> {
        let provider = self.provider.as_ref()?;
        let Some(timeout) = remaining_timeout(self.request_timeout, deadline) else {
            tracing::warn!("Request budget exhausted before rerank; keeping fused order");
            return None;
        };

        let documents: Vec<RerankDocument> = head
            .iter()
            .filter_map(|candidate| {
                self.catalog.get(candidate.product_id).map(|product| RerankDocument {
                    id: candidate.product_id,
                    text: product.search_document(),
                })
            })
            .collect();

        let scored = with_timeout(
            "Rerank request",
            timeout,
            provider.rerank(query_text, &documents, documents.len()),
        )
        .await
        .map_err(|e| tracing::warn!(error = %e, "Rerank request degraded"))
        .ok()?;

        if scored.is_empty() {
            return None;
        }

        // Reorder the head by provider relevance; ids the provider did not
        // return (or fabricated) keep their fused order after the scored ones
        let by_id: AHashMap<u32, &FusedCandidate> =
            head.iter().map(|c| (c.product_id, c)).collect();

        let mut reordered: Vec<FusedCandidate> = Vec::with_capacity(head.len());
        let mut seen: Vec<u32> = Vec::with_capacity(head.len());
        for doc in &scored {
            if let Some(&candidate) = by_id.get(&doc.id) {
                if seen.contains(&doc.id) {
                    continue;
                }
                let mut candidate = candidate.clone();
                candidate.fused_score = doc.score;
                reordered.push(candidate);
                seen.push(doc.id);
            }
        }
        if reordered.is_empty() {
            // Provider returned only unknown ids: malformed output
            return None;
        }
        for candidate in head {
            if !seen.contains(&candidate.product_id) {
                reordered.push(candidate.clone());
            }
        }

        Some(reordered)
    }
}

struct SignalStrength {
    fields: usize,
    spread: f32,
    /// Combined field/spread strength in [0, 1]
    score: f32,
    is_strong: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::product;
    use crate::provider::{ProviderError, RerankedDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> Arc<CatalogIndex> {
        Arc::new(
            CatalogIndex::from_products(vec![
                product(1, "Blazers", vec![0.1]),
                product(2, "Tshirts", vec![0.2]),
                product(3, "Jeans", vec![0.3]),
                product(4, "Shirts", vec![0.4]),
            ])
            .unwrap(),
        )
    }

    fn fused(ids_scores: &[(u32, f32)]) -> Vec<FusedCandidate> {
        ids_scores
            .iter()
            .enumerate()
            .map(|(i, &(id, score))| FusedCandidate {
                product_id: id,
                fused_score: score,
                lexical_rank: Some(i + 1),
                dense_rank: None,
            })
            .collect()
    }

    fn config() -> RerankConfig {
        RerankConfig {
            enabled: true,
            max_depth: 4,
            strong_signal_fields: 3,
            min_score_spread: 0.15,
        }
    }

    struct CountingReverser {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RerankProvider for CountingReverser {
        async fn rerank(
            &self,
            _query: &str,
            documents: &[RerankDocument],
            _top_n: usize,
        ) -> Result<Vec<RerankedDocument>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(documents
                .iter()
                .rev()
                .enumerate()
                .map(|(i, d)| RerankedDocument {
                    id: d.id,
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "reverser"
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl RerankProvider for FailingReranker {
        async fn rerank(
            &self,
            _: &str,
            _: &[RerankDocument],
            _: usize,
        ) -> Result<Vec<RerankedDocument>, ProviderError> {
            Err(ProviderError::Unavailable("offline".to_string()))
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct SlowReranker;

    #[async_trait]
    impl RerankProvider for SlowReranker {
        async fn rerank(
            &self,
            _: &str,
            _: &[RerankDocument],
            _: usize,
        ) -> Result<Vec<RerankedDocument>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn strong_intent() -> Intent {
        Intent {
            gender: Some("Men".to_string()),
            article_types: vec!["Blazers".to_string()],
            colors: vec!["Navy Blue".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn strong_signal_skips_the_provider() {
        let provider = Arc::new(CountingReverser {
            calls: AtomicUsize::new(0),
        });
        let reranker = AdaptiveReranker::new(
            catalog(),
            Some(Arc::clone(&provider) as Arc<dyn RerankProvider>),
            config(),
            Duration::from_millis(50),
        );

        // Well-separated scores and three populated intent fields
        let result = reranker
            .rerank(
                "navy blazer",
                fused(&[(1, 1.0), (2, 0.5), (3, 0.2)]),
                &strong_intent(),
                2,
                None,
            )
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].product_id, 1);
    }

    #[tokio::test]
    async fn weak_signal_invokes_provider_and_reorders() {
        let provider = Arc::new(CountingReverser {
            calls: AtomicUsize::new(0),
        });
        let reranker = AdaptiveReranker::new(
            catalog(),
            Some(Arc::clone(&provider) as Arc<dyn RerankProvider>),
            config(),
            Duration::from_millis(50),
        );

        // Flat scores, empty intent: ambiguous query
        let result = reranker
            .rerank(
                "something",
                fused(&[(1, 0.5), (2, 0.5), (3, 0.5), (4, 0.5)]),
                &Intent::default(),
                2,
                None,
            )
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        // Reverser puts the last head candidate first
        assert_eq!(result[0].product_id, 4);
        assert_eq!(result.len(), 4);
    }

    #[tokio::test]
    async fn provider_failure_keeps_fused_order() {
        let reranker = AdaptiveReranker::new(
            catalog(),
            Some(Arc::new(FailingReranker)),
            config(),
            Duration::from_millis(50),
        );

        let input = fused(&[(1, 0.5), (2, 0.5), (3, 0.5)]);
        let result = reranker
            .rerank("something", input.clone(), &Intent::default(), 2, None)
            .await;

        let ids: Vec<u32> = result.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn provider_timeout_keeps_fused_order() {
        let reranker = AdaptiveReranker::new(
            catalog(),
            Some(Arc::new(SlowReranker)),
            config(),
            Duration::from_millis(50),
        );

        let result = reranker
            .rerank(
                "something",
                fused(&[(1, 0.5), (2, 0.5), (3, 0.5)]),
                &Intent::default(),
                2,
                None,
            )
            .await;

        let ids: Vec<u32> = result.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn disabled_rerank_truncates_fused_order() {
        let mut cfg = config();
        cfg.enabled = false;
        let reranker =
            AdaptiveReranker::new(catalog(), None, cfg, Duration::from_millis(50));

        let result = reranker
            .rerank(
                "something",
                fused(&[(1, 0.9), (2, 0.5), (3, 0.3)]),
                &Intent::default(),
                2,
                None,
            )
            .await;

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].product_id, 1);
    }

    #[test]
    fn depth_deepens_as_signal_weakens() {
        let reranker =
            AdaptiveReranker::new(catalog(), None, config(), Duration::from_millis(50));

        let weak = SignalStrength {
            fields: 0,
            spread: 0.0,
            score: 0.0,
            is_strong: false,
        };
        let moderate = SignalStrength {
            fields: 2,
            spread: 0.1,
            score: 0.6,
            is_strong: false,
        };

        let deep = reranker.adaptive_depth(&weak, 2, 100);
        let shallow = reranker.adaptive_depth(&moderate, 2, 100);
        assert!(deep > shallow);
        assert!(deep <= reranker.config.max_depth);
    }
}
