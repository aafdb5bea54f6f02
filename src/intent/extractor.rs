//! Heuristic-first intent extraction with optional external enrichment
//!
//! The extractor always produces a baseline intent from fixed vocabularies
//! and the catalog's own article-type/colour lists. Only when the heuristic
//! signal is weak does it spend one bounded-timeout call on the external
//! structured-extraction provider, and that call is allowed to fail without
//! consequence: extraction as a whole never raises.

use super::{extend_dedup, Intent, IntentCache, VisionSummary};
use crate::catalog::CatalogIndex;
use crate::provider::{remaining_timeout, with_timeout, ExtractionProvider};
use crate::query;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stopwords and filler excluded from style keywords and lexical scoring
pub(crate) const GENERIC_KEYWORDS: &[&str] = &[
    "a", "an", "and", "for", "from", "i", "in", "is", "item", "look", "my", "need", "of", "on",
    "outfit", "please", "search", "show", "style", "the", "this", "to", "want", "wants", "wife",
    "wives", "husband", "woman", "women", "man", "men", "girl", "girls", "boy", "boys", "her",
    "him",
];

const WOMEN_TOKENS: &[&str] = &[
    "woman", "women", "wife", "female", "ladies", "lady", "girl", "girls", "her",
];

const MEN_TOKENS: &[&str] = &[
    "man", "men", "husband", "male", "gentleman", "gentlemen", "boy", "boys", "him",
];

/// Occasion vocabulary mapping catalog usage values to trigger words
const USAGE_LEXICON: &[(&str, &[&str])] = &[
    ("Party", &["party", "wedding", "cocktail", "date", "nightout", "celebration"]),
    ("Work", &["work", "office", "business", "professional", "meeting"]),
    ("Casual", &["casual", "daily", "weekend", "relaxed"]),
    ("Formal", &["formal", "smart", "elegant", "blazer", "suit"]),
    ("Sports", &["sport", "sports", "gym", "training", "running", "active"]),
    ("Ethnic", &["ethnic", "traditional", "festive", "kurta", "saree"]),
];

const SEASONS: &[&str] = &["Summer", "Winter", "Spring", "Fall"];

/// Two-stage intent extractor: pure heuristics overlaid by an optional
/// external enrichment call
pub struct IntentExtractor {
    catalog: Arc<CatalogIndex>,
    provider: Option<Arc<dyn ExtractionProvider>>,
    cache: Arc<IntentCache>,
    enrichment_threshold: usize,
    request_timeout: Duration,
}

impl IntentExtractor {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        provider: Option<Arc<dyn ExtractionProvider>>,
        cache: Arc<IntentCache>,
        enrichment_threshold: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            provider,
            cache,
            enrichment_threshold,
            request_timeout,
        }
    }

    /// Derive an intent from normalized query text and an optional vision
    /// summary. Cached by normalized text for text-only extractions; image
    /// attributes vary per request, so vision-seeded intents bypass the
    /// cache. Never fails.
    pub async fn extract(
        &self,
        normalized_text: &str,
        vision: Option<&VisionSummary>,
        deadline: Option<Instant>,
    ) -> Intent {
        if vision.is_none() {
            if let Some(cached) = self.cache.get(normalized_text) {
                tracing::debug!(query = normalized_text, "intent cache hit");
                return (*cached).clone();
            }
        }

        let mut intent = self.heuristic_intent(normalized_text, vision);

        if intent.populated_fields() < self.enrichment_threshold {
            if let Some(provider) = &self.provider {
                match self.enrich(provider, normalized_text, deadline).await {
                    Some(overlay) => intent.merge_overlay(overlay),
                    None => {
                        tracing::warn!("Intent extraction fell back to heuristic parsing");
                    }
                }
            }
        }

        if let Some(vision) = vision {
            intent.select_primary_article(&self.catalog, &vision.confidences);
        }

        if vision.is_none() {
            self.cache.insert(normalized_text.to_string(), intent.clone());
        }
        intent
    }

    async fn enrich(
        &self,
        provider: &Arc<dyn ExtractionProvider>,
        normalized_text: &str,
        deadline: Option<Instant>,
    ) -> Option<crate::provider::IntentOverlay> {
        let timeout = remaining_timeout(self.request_timeout, deadline)?;
        let article_types: Vec<String> = self
            .catalog
            .article_types()
            .iter()
            .map(|s| s.to_string())
            .collect();

        with_timeout(
            "Intent extraction request",
            timeout,
            provider.extract(normalized_text, &article_types),
        )
        .await
        .ok()
    }

    /// Pure heuristic pass over fixed vocabularies and catalog-derived lists
    pub fn heuristic_intent(&self, text: &str, vision: Option<&VisionSummary>) -> Intent {
        let normalized = query::normalize(text);
        let tokens = query::tokenize(&normalized);
        let compact_tokens: Vec<String> = tokens.iter().map(|t| query::compact(t)).collect();
        let blob = format!(" {} ", normalized);

        let mut intent = Intent::default();

        if tokens.iter().any(|t| WOMEN_TOKENS.contains(&t.as_str())) {
            intent.gender = Some("Women".to_string());
        } else if tokens.iter().any(|t| MEN_TOKENS.contains(&t.as_str())) {
            intent.gender = Some("Men".to_string());
        }

        for article in self.catalog.article_types() {
            if self.article_matches(article, &blob, &compact_tokens) {
                intent.article_types.push(article.to_string());
            }
        }

        for colour in self.catalog.colours() {
            let colour_norm = query::normalize(colour);
            if !colour_norm.is_empty() && blob.contains(&format!(" {} ", colour_norm)) {
                intent.colors.push(colour.clone());
            }
        }

        for (usage, keywords) in USAGE_LEXICON {
            if keywords.iter().any(|k| tokens.iter().any(|t| t == k)) {
                intent.usages.push(usage.to_string());
            }
        }

        for season in SEASONS {
            if tokens.iter().any(|t| t == &season.to_lowercase()) {
                intent.seasons.push(season.to_string());
            }
        }

        intent.style_keywords = tokens
            .iter()
            .filter(|t| t.len() >= 4 && !GENERIC_KEYWORDS.contains(&t.as_str()))
            .cloned()
            .collect();

        if let Some(vision) = vision {
            self.overlay_vision(&mut intent, vision);
        }

        intent
    }

    fn article_matches(&self, article: &str, blob: &str, compact_tokens: &[String]) -> bool {
        let article_norm = query::normalize(article);
        if article_norm.is_empty() {
            return false;
        }
        if blob.contains(&format!(" {} ", article_norm)) {
            return true;
        }
        let article_compact = query::compact(article);
        if compact_tokens.iter().any(|t| t == &article_compact) {
            return true;
        }
        // Naive singular: "sneakers" matches a "sneaker" token
        let singular = article_compact.strip_suffix('s').unwrap_or("");
        !singular.is_empty() && compact_tokens.iter().any(|t| t == singular)
    }

    fn overlay_vision(&self, intent: &mut Intent, vision: &VisionSummary) {
        if let Some(gender) = &vision.gender {
            let gender_norm = query::normalize(gender);
            if !gender_norm.is_empty() && gender_norm != "unknown" && gender_norm != "unisex" {
                intent.gender = Some(gender.clone());
            }
        }

        // Vision labels lead the hint list so confidence order is preserved
        let mut articles = vision.article_types.clone();
        articles.extend(std::mem::take(&mut intent.article_types));
        intent.article_types = Vec::new();
        extend_dedup(&mut intent.article_types, articles);

        extend_dedup(&mut intent.colors, vision.colors.clone());

        if let Some(occasion) = &vision.occasion {
            if query::normalize(occasion) != "unknown" {
                extend_dedup(&mut intent.usages, vec![occasion.clone()]);
            }
        }
        if let Some(season) = &vision.season {
            if query::normalize(season) != "unknown" {
                extend_dedup(&mut intent.seasons, vec![season.clone()]);
            }
        }

        extend_dedup(&mut intent.style_keywords, vision.style_keywords.clone());
    }
}
