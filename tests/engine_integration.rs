//! End-to-end engine tests over a small in-memory catalog

use async_trait::async_trait;
use outfitter::catalog::{CatalogIndex, Product};
use outfitter::config::Config;
use outfitter::error::OutfitterError;
use outfitter::intent::{Intent, VisionSummary};
use outfitter::provider::{EmbeddingKind, EmbeddingProvider, ProviderError};
use outfitter::retrieval::{EngineProviders, RetrievalEngine, RetrieveRequest};
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

fn product(
    id: u32,
    name: &str,
    gender: &str,
    article_type: &str,
    sub_category: &str,
    colour: &str,
    usage: &str,
    embedding: Vec<f32>,
) -> Product {
    Product {
        id,
        name: name.to_string(),
        gender: gender.to_string(),
        master_category: if sub_category == "Shoes" {
            "Footwear".to_string()
        } else {
            "Apparel".to_string()
        },
        sub_category: sub_category.to_string(),
        article_type: article_type.to_string(),
        base_colour: colour.to_string(),
        season: "Summer".to_string(),
        year: Some(2019),
        usage: usage.to_string(),
        image: None,
        embedding,
    }
}

fn wardrobe() -> Vec<Product> {
    vec![
        product(1, "Arrow Men Navy Blue Blazer", "Men", "Blazers", "Topwear", "Navy Blue", "Formal", vec![1.0, 0.0, 0.0]),
        product(2, "Arrow Men Red Blazer", "Men", "Blazers", "Topwear", "Red", "Formal", vec![0.9, 0.1, 0.0]),
        product(3, "Puma Men Blue Tshirt", "Men", "Tshirts", "Topwear", "Blue", "Casual", vec![0.0, 1.0, 0.0]),
        product(4, "Nike Men Black Tshirt", "Men", "Tshirts", "Topwear", "Black", "Casual", vec![0.0, 0.9, 0.1]),
        product(5, "Puma Men Grey Tshirt", "Men", "Tshirts", "Topwear", "Grey", "Casual", vec![0.0, 0.8, 0.2]),
        product(6, "Levis Men Blue Jeans", "Men", "Jeans", "Bottomwear", "Blue", "Casual", vec![0.0, 0.0, 1.0]),
        product(7, "Levis Men Black Jeans", "Men", "Jeans", "Bottomwear", "Black", "Casual", vec![0.0, 0.1, 0.9]),
        product(8, "Arrow Men White Shirt", "Men", "Shirts", "Topwear", "White", "Formal", vec![0.5, 0.5, 0.0]),
        product(9, "Allen Solly Men Khaki Trousers", "Men", "Trousers", "Bottomwear", "Khaki", "Formal", vec![0.0, 0.2, 0.8]),
        product(10, "Nike Men White Sneakers", "Men", "Casual Shoes", "Shoes", "White", "Casual", vec![0.1, 0.3, 0.6]),
        product(11, "Adidas Men Green Tshirt", "Men", "Tshirts", "Topwear", "Green", "Casual", vec![0.0, 0.85, 0.15]),
        product(12, "Reebok Men Maroon Tshirt", "Men", "Tshirts", "Topwear", "Maroon", "Casual", vec![0.0, 0.75, 0.25]),
    ]
}

fn engine(providers: EngineProviders) -> RetrievalEngine {
    let catalog = Arc::new(CatalogIndex::from_products(wardrobe()).unwrap());
    let mut config = Config::default();
    config.providers.request_timeout_ms = 50;
    config.providers.request_budget_ms = 200;
    RetrievalEngine::new(config, catalog, providers).unwrap()
}

struct SlowEmbedder;

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, _text: &str, _kind: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![0.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "slow-mock"
    }
}

/// Embeds every query onto the t-shirt axis of the wardrobe's vector space
struct TshirtEmbedder;

#[async_trait]
impl EmbeddingProvider for TshirtEmbedder {
    async fn embed(&self, _text: &str, _kind: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![0.0, 1.0, 0.0])
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "tshirt-mock"
    }
}

struct MismatchedEmbedder;

#[async_trait]
impl EmbeddingProvider for MismatchedEmbedder {
    async fn embed(&self, _text: &str, _kind: EmbeddingKind) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![0.0; 384])
    }

    fn dimension(&self) -> usize {
        384
    }

    fn model_name(&self) -> &str {
        "mismatched-mock"
    }
}

#[tokio::test]
async fn colour_intent_outranks_fused_order() {
    let engine = engine(EngineProviders::default());

    let results = engine
        .retrieve(RetrieveRequest::search("navy blue blazer for men", 3))
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].product_id, 1, "navy blazer should outrank the red one");
    assert_eq!(results[0].rank, 1);
    assert!(results[0].final_score >= results[results.len() - 1].final_score);
}

#[tokio::test]
async fn embedding_timeout_degrades_to_lexical_results() {
    let engine = engine(EngineProviders {
        embedding: Some(Arc::new(SlowEmbedder)),
        ..Default::default()
    });

    let results = engine
        .retrieve(RetrieveRequest::search("blue tshirt", 3))
        .await
        .unwrap();

    assert!(
        !results.is_empty(),
        "lexical retrieval must carry the request when the embedder times out"
    );
    assert_eq!(results[0].product_id, 3);
}

#[tokio::test]
async fn both_generators_contribute_to_the_ranked_output() {
    let engine = engine(EngineProviders {
        embedding: Some(Arc::new(TshirtEmbedder)),
        ..Default::default()
    });

    let results = engine
        .retrieve(RetrieveRequest::search("soft cotton tee for men", 3))
        .await
        .unwrap();

    assert!(!results.is_empty());
    let catalog = engine.catalog();
    assert_eq!(catalog.get(results[0].product_id).unwrap().article_type, "Tshirts");
    assert!(
        results
            .iter()
            .any(|r| r.signals.contains(&"Semantic similarity".to_string())),
        "dense candidates should surface in the explanation signals"
    );
    assert!(
        results
            .iter()
            .any(|r| r.signals.contains(&"Keyword relevance".to_string())),
        "lexical candidates should surface in the explanation signals"
    );
}

#[tokio::test]
async fn refine_honors_caller_supplied_intent() {
    let engine = engine(EngineProviders::default());
    let intent = Intent {
        gender: Some("Men".to_string()),
        article_types: vec!["Blazers".to_string()],
        colors: vec!["Navy Blue".to_string()],
        ..Default::default()
    };

    let results = engine
        .retrieve(RetrieveRequest::Refine {
            query: "blazer".to_string(),
            intent,
            top_k: 3,
        })
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].product_id, 1, "the caller's colour preference should win");
}

#[tokio::test]
async fn refine_with_empty_query_ranks_on_intent_alone() {
    let engine = engine(EngineProviders::default());
    let intent = Intent {
        gender: Some("Men".to_string()),
        article_types: vec!["Jeans".to_string()],
        ..Default::default()
    };

    let results = engine
        .retrieve(RetrieveRequest::Refine {
            query: String::new(),
            intent,
            top_k: 3,
        })
        .await
        .unwrap();

    assert!(!results.is_empty());
    let catalog = engine.catalog();
    assert_eq!(catalog.get(results[0].product_id).unwrap().article_type, "Jeans");
}

#[tokio::test]
async fn vision_primary_article_keeps_results_on_type() {
    let engine = engine(EngineProviders::default());
    let vision = VisionSummary {
        gender: Some("Men".to_string()),
        article_types: vec!["Tshirts".to_string(), "Jeans".to_string()],
        confidences: vec![0.92, 0.41],
        ..Default::default()
    };

    let results = engine
        .retrieve(RetrieveRequest::Search {
            query: "men casual".to_string(),
            vision: Some(vision),
            top_k: 5,
        })
        .await
        .unwrap();

    assert!(!results.is_empty());
    let catalog = engine.catalog();
    let on_type = results
        .iter()
        .filter(|r| catalog.get(r.product_id).unwrap().article_type == "Tshirts")
        .count();
    assert!(
        on_type * 5 >= results.len() * 4,
        "at least 80% of results should match the dominant detected article type, got {}/{}",
        on_type,
        results.len()
    );
}

#[tokio::test]
async fn complete_the_look_excludes_anchor_and_spans_the_outfit() {
    let engine = engine(EngineProviders::default());

    let results = engine
        .retrieve(RetrieveRequest::CompleteTheLook {
            anchor_id: 8,
            top_k: 4,
        })
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.product_id != 8));

    let catalog = engine.catalog();
    let top_article = &catalog.get(results[0].product_id).unwrap().article_type;
    assert_ne!(top_article, "Shirts", "the top pairing should be a different piece");

    // Diversification: no article type repeats before every represented
    // type has appeared once
    let articles: Vec<&str> = results
        .iter()
        .map(|r| catalog.get(r.product_id).unwrap().article_type.as_str())
        .collect();
    let mut seen: Vec<&str> = Vec::new();
    let mut repeats_started = false;
    for article in &articles {
        if seen.contains(article) {
            repeats_started = true;
        } else {
            assert!(!repeats_started, "new type {} appeared after a repeat", article);
            seen.push(article);
        }
    }
}

#[tokio::test]
async fn unknown_anchor_is_an_invalid_request() {
    let engine = engine(EngineProviders::default());

    let result = engine
        .retrieve(RetrieveRequest::CompleteTheLook {
            anchor_id: 9999,
            top_k: 4,
        })
        .await;

    assert!(matches!(result, Err(OutfitterError::InvalidRequest(_))));
}

#[tokio::test]
async fn empty_query_is_a_valid_empty_result() {
    let engine = engine(EngineProviders::default());

    let results = engine
        .retrieve(RetrieveRequest::search("   !!! ???  ", 5))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn zero_top_k_is_rejected() {
    let engine = engine(EngineProviders::default());

    let result = engine.retrieve(RetrieveRequest::search("blazer", 0)).await;
    assert!(matches!(result, Err(OutfitterError::InvalidRequest(_))));
}

#[tokio::test]
async fn repeated_searches_hit_the_intent_cache() {
    let engine = engine(EngineProviders::default());

    for _ in 0..3 {
        engine
            .retrieve(RetrieveRequest::search("blue tshirt", 3))
            .await
            .unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.searches, 3);
    assert_eq!(stats.intent_cache_entries, 1);
    assert!(stats.intent_cache_hits >= 2);
}

#[tokio::test]
async fn dimension_mismatch_is_fatal_at_construction() {
    let catalog = Arc::new(CatalogIndex::from_products(wardrobe()).unwrap());
    let result = RetrievalEngine::new(
        Config::default(),
        catalog,
        EngineProviders {
            embedding: Some(Arc::new(MismatchedEmbedder)),
            ..Default::default()
        },
    );

    assert!(matches!(result, Err(OutfitterError::Config(_))));
}

#[tokio::test]
async fn catalog_loads_from_json_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for item in wardrobe() {
        writeln!(file, "{}", serde_json::to_string(&item).unwrap()).unwrap();
    }

    let catalog = CatalogIndex::load(file.path()).unwrap();
    assert_eq!(catalog.len(), 12);
    assert_eq!(catalog.embedding_dim(), 3);

    let engine = RetrievalEngine::new(
        Config::default(),
        Arc::new(catalog),
        EngineProviders::default(),
    )
    .unwrap();
    let results = engine
        .retrieve(RetrieveRequest::search("white sneakers", 2))
        .await
        .unwrap();
    assert_eq!(results[0].product_id, 10);
}
