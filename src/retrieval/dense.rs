//! Dense candidate generation by embedding similarity
//!
//! The query is embedded through the external provider (cached by normalized
//! text), then scored by cosine similarity against the catalog's precomputed
//! embedding matrix. The dense path degrades silently: any provider failure,
//! timeout, or malformed vector yields an empty candidate list and fusion
//! carries on with the lexical side alone.

use crate::catalog::CatalogIndex;
use crate::provider::{remaining_timeout, with_timeout, EmbeddingKind, EmbeddingProvider};
use crate::retrieval::{Candidate, CandidateSource};
use ahash::AHashMap;
use ndarray::{Array1, Array2};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Append-only query-embedding cache keyed by normalized query text.
///
/// Entries are never invalidated within a process lifetime: a query is
/// treated as stable once embedded. Every stored vector must match the
/// catalog embedding dimension.
pub struct EmbeddingCache {
    entries: Mutex<AHashMap<String, Arc<Vec<f32>>>>,
    dimension: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            dimension,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        let entries = self.entries.lock().expect("embedding cache poisoned");
        match entries.get(key) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(vector))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a vector; rejected (returning `None`) when the dimension does
    /// not match the catalog's
    pub fn insert(&self, key: String, vector: Vec<f32>) -> Option<Arc<Vec<f32>>> {
        if vector.len() != self.dimension {
            return None;
        }
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        let value = Arc::new(vector);
        entries.entry(key).or_insert_with(|| Arc::clone(&value));
        Some(value)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("embedding cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Dense candidate generator over the catalog embedding matrix
pub struct DenseGenerator {
    catalog: Arc<CatalogIndex>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    cache: Arc<EmbeddingCache>,
    /// Row-per-product embedding matrix, rows in catalog insertion order
    matrix: Array2<f32>,
    norms: Array1<f32>,
    request_timeout: Duration,
}

impl DenseGenerator {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        cache: Arc<EmbeddingCache>,
        request_timeout: Duration,
    ) -> Self {
        let dim = catalog.embedding_dim();
        let rows = catalog.len();
        let mut flat = Vec::with_capacity(rows * dim);
        for product in catalog.all() {
            flat.extend_from_slice(&product.embedding);
        }
        let matrix = Array2::from_shape_vec((rows, dim), flat)
            .expect("catalog embeddings validated at load");
        let norms = matrix
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect::<Array1<f32>>();

        Self {
            catalog,
            provider,
            cache,
            matrix,
            norms,
            request_timeout,
        }
    }

    /// Generate at most `pool_size` candidates by cosine similarity,
    /// descending, ties broken by ascending product id. Returns an empty
    /// list when no provider is configured or the embedding call degrades.
    pub async fn generate(
        &self,
        normalized_text: &str,
        pool_size: usize,
        deadline: Option<Instant>,
    ) -> Vec<Candidate> {
        if normalized_text.is_empty() || self.catalog.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.query_embedding(normalized_text, deadline).await {
            Some(vector) => vector,
            None => return Vec::new(),
        };

        self.top_k_cosine(&query_vector, pool_size)
    }

    async fn query_embedding(
        &self,
        normalized_text: &str,
        deadline: Option<Instant>,
    ) -> Option<Arc<Vec<f32>>> {
        if let Some(cached) = self.cache.get(normalized_text) {
            tracing::debug!(query = normalized_text, "embedding cache hit");
            return Some(cached);
        }

        let provider = self.provider.as_ref()?;
        let Some(timeout) = remaining_timeout(self.request_timeout, deadline) else {
            tracing::warn!("Request budget exhausted before query embedding; dense path skipped");
            return None;
        };

        let result = with_timeout(
            "Query embedding request",
            timeout,
            provider.embed(normalized_text, EmbeddingKind::Query),
        )
        .await;

        match result {
            Ok(vector) => match self.cache.insert(normalized_text.to_string(), vector) {
                Some(vector) => Some(vector),
                None => {
                    tracing::warn!(
                        expected = self.cache.dimension(),
                        "Embedding provider returned a wrong-dimension vector; dense path skipped"
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Dense retrieval unavailable for this request");
                None
            }
        }
    }

    fn top_k_cosine(&self, query: &[f32], pool_size: usize) -> Vec<Candidate> {
        let query = Array1::from_vec(query.to_vec());
        let query_norm = query.dot(&query).sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<Candidate> = self
            .matrix
            .rows()
            .into_iter()
            .zip(self.norms.iter())
            .zip(self.catalog.all())
            .map(|((row, &norm), product)| {
                let similarity = if norm == 0.0 {
                    0.0
                } else {
                    row.dot(&query) / (norm * query_norm)
                };
                Candidate {
                    product_id: product.id,
                    score: similarity,
                    source: CandidateSource::Dense,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        scored.truncate(pool_size);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::product;
    use crate::provider::ProviderError;
    use async_trait::async_trait;

    fn catalog() -> Arc<CatalogIndex> {
        Arc::new(
            CatalogIndex::from_products(vec![
                product(1, "Blazers", vec![1.0, 0.0]),
                product(2, "Tshirts", vec![0.0, 1.0]),
                product(3, "Jeans", vec![0.7, 0.7]),
            ])
            .unwrap(),
        )
    }

    struct FixedProvider(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, _: &str, _: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
            Ok(self.0.clone())
        }
        fn dimension(&self) -> usize {
            self.0.len()
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _: &str, _: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0, 0.0])
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn generator(provider: Option<Arc<dyn EmbeddingProvider>>) -> DenseGenerator {
        let catalog = catalog();
        let cache = Arc::new(EmbeddingCache::new(catalog.embedding_dim()));
        DenseGenerator::new(catalog, provider, cache, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn ranks_by_cosine_similarity() {
        let generator = generator(Some(Arc::new(FixedProvider(vec![1.0, 0.1]))));
        let candidates = generator.generate("navy blazer", 3, None).await;

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].product_id, 1);
        assert!(candidates[0].score > candidates[1].score);
    }

    #[tokio::test]
    async fn pool_size_bounds_output() {
        let generator = generator(Some(Arc::new(FixedProvider(vec![1.0, 0.0]))));
        let candidates = generator.generate("navy blazer", 1, None).await;
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn missing_provider_degrades_to_empty() {
        let generator = generator(None);
        assert!(generator.generate("navy blazer", 3, None).await.is_empty());
    }

    #[tokio::test]
    async fn slow_provider_degrades_to_empty() {
        let generator = generator(Some(Arc::new(SlowProvider)));
        assert!(generator.generate("navy blazer", 3, None).await.is_empty());
    }

    #[tokio::test]
    async fn wrong_dimension_vector_is_rejected() {
        let generator = generator(Some(Arc::new(FixedProvider(vec![1.0, 0.0, 0.5]))));
        assert!(generator.generate("navy blazer", 3, None).await.is_empty());
        assert!(generator.cache.is_empty());
    }

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let generator = generator(Some(Arc::new(FixedProvider(vec![0.0, 1.0]))));
        generator.generate("red tshirt", 3, None).await;
        generator.generate("red tshirt", 3, None).await;
        assert_eq!(generator.cache.hits(), 1);
        assert_eq!(generator.cache.misses(), 1);
        assert_eq!(generator.cache.len(), 1);
    }

    #[tokio::test]
    async fn equal_similarity_ties_break_by_product_id() {
        let catalog = Arc::new(
            CatalogIndex::from_products(vec![
                product(9, "Tshirts", vec![1.0, 0.0]),
                product(4, "Jeans", vec![1.0, 0.0]),
            ])
            .unwrap(),
        );
        let cache = Arc::new(EmbeddingCache::new(2));
        let generator = DenseGenerator::new(
            catalog,
            Some(Arc::new(FixedProvider(vec![1.0, 0.0]))),
            cache,
            Duration::from_millis(50),
        );

        let candidates = generator.generate("tshirt", 2, None).await;
        assert_eq!(candidates[0].product_id, 4);
        assert_eq!(candidates[1].product_id, 9);
    }
}
