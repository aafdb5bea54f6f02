//! Lexical candidate generation by token and metadata overlap
//!
//! Scores every catalog product against the query with a weighted sum of
//! exact-field matches (against the extracted intent) and token/phrase hits
//! in the product's search document. Pure and infallible: no provider
//! involvement, ties broken by catalog insertion order.

use crate::catalog::CatalogIndex;
use crate::intent::{Intent, GENERIC_KEYWORDS};
use crate::query;
use crate::retrieval::{Candidate, CandidateSource};
use std::sync::Arc;

// Field-match weights, strongest signal first
const WEIGHT_PHRASE: f32 = 4.0;
const WEIGHT_ARTICLE: f32 = 3.0;
const WEIGHT_COLOUR: f32 = 2.0;
const WEIGHT_GENDER: f32 = 1.5;
const WEIGHT_USAGE: f32 = 1.0;
const WEIGHT_TOKEN: f32 = 1.0;
const WEIGHT_SEASON: f32 = 0.5;

/// Lexical candidate generator with precomputed normalized search documents
pub struct LexicalGenerator {
    catalog: Arc<CatalogIndex>,
    docs_normalized: Vec<String>,
    min_token_len: usize,
}

impl LexicalGenerator {
    pub fn new(catalog: Arc<CatalogIndex>, min_token_len: usize) -> Self {
        let docs_normalized = catalog
            .all()
            .iter()
            .map(|p| query::normalize(&p.search_document()))
            .collect();
        Self {
            catalog,
            docs_normalized,
            min_token_len,
        }
    }

    /// Generate at most `pool_size` candidates, highest score first. Ties
    /// keep catalog insertion order (stable sort). Never fails; an empty
    /// catalog or a query with no overlap yields an empty list.
    pub fn generate(
        &self,
        intent: &Intent,
        normalized_text: &str,
        pool_size: usize,
    ) -> Vec<Candidate> {
        let tokens: Vec<String> = query::tokenize(normalized_text)
            .into_iter()
            .filter(|t| t.len() >= self.min_token_len && !GENERIC_KEYWORDS.contains(&t.as_str()))
            .collect();
        let query_blob = format!(" {} ", normalized_text);

        let mut scored: Vec<Candidate> = Vec::new();
        for (row, product) in self.catalog.all().iter().enumerate() {
            let doc = &self.docs_normalized[row];
            let doc_blob = format!(" {} ", doc);

            let mut score = 0.0;

            if !normalized_text.is_empty() && doc_blob.contains(query_blob.as_str()) {
                score += WEIGHT_PHRASE;
            }

            for token in &tokens {
                if doc_blob.contains(&format!(" {} ", token)) {
                    score += WEIGHT_TOKEN;
                }
            }

            if let Some(gender) = &intent.gender {
                if query::normalize(gender) == query::normalize(&product.gender) {
                    score += WEIGHT_GENDER;
                }
            }
            if field_matches(&intent.article_types, &product.article_type) {
                score += WEIGHT_ARTICLE;
            }
            if field_matches(&intent.colors, &product.base_colour) {
                score += WEIGHT_COLOUR;
            }
            if field_matches(&intent.usages, &product.usage) {
                score += WEIGHT_USAGE;
            }
            if field_matches(&intent.seasons, &product.season) {
                score += WEIGHT_SEASON;
            }

            if score > 0.0 {
                scored.push(Candidate {
                    product_id: product.id,
                    score,
                    source: CandidateSource::Lexical,
                });
            }
        }

        // Stable: equal scores keep catalog insertion order
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(pool_size);
        scored
    }
}

fn field_matches(hints: &[String], value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let value_norm = query::normalize(value);
    hints.iter().any(|h| query::normalize(h) == value_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::product;
    use crate::catalog::Product;

    fn small_catalog() -> Arc<CatalogIndex> {
        let mut navy = product(1, "Blazers", vec![0.1, 0.2]);
        navy.name = "Classic Navy Blue Blazer".to_string();
        navy.base_colour = "Navy Blue".to_string();
        navy.usage = "Formal".to_string();

        let mut red = product(2, "Blazers", vec![0.3, 0.4]);
        red.name = "Red Evening Blazer".to_string();
        red.base_colour = "Red".to_string();
        red.usage = "Formal".to_string();

        let mut shoes: Product = product(3, "Sports Shoes", vec![0.5, 0.6]);
        shoes.name = "White Running Shoes".to_string();
        shoes.base_colour = "White".to_string();
        shoes.usage = "Sports".to_string();

        Arc::new(CatalogIndex::from_products(vec![navy, red, shoes]).unwrap())
    }

    #[test]
    fn colour_and_field_matches_outrank_partial_matches() {
        let catalog = small_catalog();
        let generator = LexicalGenerator::new(catalog, 3);
        let intent = Intent {
            article_types: vec!["Blazers".to_string()],
            colors: vec!["Navy Blue".to_string()],
            usages: vec!["Formal".to_string()],
            ..Default::default()
        };

        let candidates = generator.generate(&intent, "navy blue blazer", 10);

        assert_eq!(candidates[0].product_id, 1);
        assert!(candidates[0].score > candidates[1].score);
    }

    #[test]
    fn pool_size_bounds_output() {
        let catalog = small_catalog();
        let generator = LexicalGenerator::new(catalog, 3);
        let candidates = generator.generate(&Intent::default(), "blazer shoes", 1);
        assert!(candidates.len() <= 1);
    }

    #[test]
    fn all_candidates_reference_known_products() {
        let catalog = small_catalog();
        let generator = LexicalGenerator::new(Arc::clone(&catalog), 3);
        let candidates = generator.generate(&Intent::default(), "blazer formal white", 10);
        assert!(!candidates.is_empty());
        for candidate in &candidates {
            assert!(catalog.get(candidate.product_id).is_some());
        }
    }

    #[test]
    fn no_overlap_yields_empty() {
        let catalog = small_catalog();
        let generator = LexicalGenerator::new(catalog, 3);
        let candidates = generator.generate(&Intent::default(), "quantum flux capacitor", 10);
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_catalog_yields_empty() {
        let catalog = Arc::new(CatalogIndex::from_products(vec![]).unwrap());
        let generator = LexicalGenerator::new(catalog, 3);
        assert!(generator
            .generate(&Intent::default(), "anything", 10)
            .is_empty());
    }

    #[test]
    fn ties_keep_catalog_insertion_order() {
        let catalog = Arc::new(
            CatalogIndex::from_products(vec![
                product(10, "Tshirts", vec![0.1]),
                product(11, "Tshirts", vec![0.2]),
            ])
            .unwrap(),
        );
        let generator = LexicalGenerator::new(catalog, 3);
        let candidates = generator.generate(&Intent::default(), "tshirt", 10);
        assert_eq!(candidates[0].product_id, 10);
        assert_eq!(candidates[1].product_id, 11);
    }
}
