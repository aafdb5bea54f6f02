//! Deterministic business scoring rules
//!
//! After fusion and reranking, every candidate passes through an ordered
//! list of scoring rules. Each rule inspects the product against the query
//! intent (or the anchor product for pairing requests) and contributes a
//! fixed score delta plus an optional human-readable signal. Rule order and
//! constants are fixed so the same inputs always produce the same ranking.

use crate::catalog::{CatalogIndex, Product};
use crate::intent::Intent;
use crate::query::normalize;
use crate::retrieval::{FusedCandidate, RankedRecommendation};
use std::sync::Arc;

const GENDER_MATCH: f32 = 0.30;
const GENDER_MISMATCH: f32 = -0.45;
const ARTICLE_EXACT: f32 = 0.24;
const ARTICLE_PARTIAL: f32 = 0.12;
const ARTICLE_MISS: f32 = -0.08;
const PRIMARY_ARTICLE_CONFLICT: f32 = -0.40;
const COLOUR_MATCH: f32 = 0.12;
const USAGE_MATCH: f32 = 0.10;
const SEASON_MATCH: f32 = 0.08;
const STYLE_KEYWORD_MATCH: f32 = 0.06;
const RECENCY_WEIGHT: f32 = 0.05;
const RECENCY_BASE_YEAR: f32 = 2008.0;
const RECENCY_SPAN_YEARS: f32 = 20.0;

const PAIR_DIFFERENT_ARTICLE: f32 = 0.24;
const PAIR_SAME_ARTICLE: f32 = -0.05;
const PAIR_COMPLEMENT_TOKEN: f32 = 0.18;
const PAIR_DIFFERENT_MASTER: f32 = 0.09;

const MAX_SIGNALS: usize = 4;

/// Complement vocabulary keyed by anchor article-type token. A candidate
/// whose document mentions one of the hint tokens pairs naturally with the
/// anchor piece.
// "tshirt" must precede "shirt": matching is by substring
const COMPLEMENTARY_HINTS: &[(&str, &str)] = &[
    ("tshirt", "jeans sneakers"),
    ("shirt", "trousers sneakers"),
    ("tops", "bottomwear shoes"),
    ("kurta", "bottomwear sandals"),
    ("dress", "heels outerwear"),
    ("jeans", "tops sneakers"),
    ("trousers", "tops shoes"),
    ("shoes", "tops bottomwear"),
    ("flip flops", "casual tops"),
];

/// Hint tokens complementary to an anchor article type, if any.
pub(crate) fn complement_hints(article_type: &str) -> Option<&'static str> {
    let article = normalize(article_type);
    COMPLEMENTARY_HINTS
        .iter()
        .find(|(key, _)| article.contains(key))
        .map(|(_, hints)| *hints)
}

/// Everything a rule may inspect when scoring one candidate.
pub struct RuleContext<'a> {
    pub intent: &'a Intent,
    /// Anchor product for pairing requests, absent for plain search
    pub anchor: Option<&'a Product>,
    pub prefer_newest: bool,
}

/// The contribution of one rule to one candidate.
pub struct RuleEffect {
    pub delta: f32,
    pub signal: Option<&'static str>,
}

impl RuleEffect {
    fn delta(delta: f32) -> Self {
        Self { delta, signal: None }
    }

    fn with_signal(delta: f32, signal: &'static str) -> Self {
        Self {
            delta,
            signal: Some(signal),
        }
    }
}

pub trait ScoringRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score one product, or `None` when the rule does not apply.
    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect>;
}

/// Coarse quality bucket derived from the rule confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MatchVerdict {
    Strong,
    Good,
    Possible,
    Weak,
}

/// The rule layer's explanation for one candidate.
pub struct MatchAssessment {
    pub delta: f32,
    pub confidence: f32,
    pub verdict: MatchVerdict,
    pub signals: Vec<String>,
}

/// Ordered rule list applied uniformly to every candidate.
pub struct RuleEngine {
    catalog: Arc<CatalogIndex>,
    rules: Vec<Box<dyn ScoringRule>>,
}

impl RuleEngine {
    /// Rule set for text search requests.
    pub fn for_search(catalog: Arc<CatalogIndex>) -> Self {
        Self {
            catalog,
            rules: vec![
                Box::new(GenderRule),
                Box::new(ArticleTypeRule),
                Box::new(PrimaryArticleRule),
                Box::new(ColourRule),
                Box::new(UsageRule),
                Box::new(SeasonRule),
                Box::new(StyleKeywordRule),
                Box::new(RecencyRule),
            ],
        }
    }

    /// Rule set for complete-the-look requests: pairing rules first, then
    /// the same attribute rules as search.
    pub fn for_pairing(catalog: Arc<CatalogIndex>) -> Self {
        Self {
            catalog,
            rules: vec![
                Box::new(DifferentArticleRule),
                Box::new(ComplementTokenRule),
                Box::new(DifferentMasterCategoryRule),
                Box::new(GenderRule),
                Box::new(ColourRule),
                Box::new(UsageRule),
                Box::new(SeasonRule),
                Box::new(RecencyRule),
            ],
        }
    }

    /// Apply every rule to one candidate and fold the effects into an
    /// assessment with explanation signals.
    pub fn assess(&self, candidate: &FusedCandidate, product: &Product, ctx: &RuleContext<'_>) -> MatchAssessment {
        let mut delta = 0.0;
        let mut signals: Vec<String> = Vec::new();

        if candidate.lexical_rank.is_some() {
            signals.push("Keyword relevance".to_string());
        }
        if candidate.dense_rank.is_some() {
            signals.push("Semantic similarity".to_string());
        }

        for rule in &self.rules {
            if let Some(effect) = rule.apply(product, ctx) {
                tracing::trace!(
                    rule = rule.name(),
                    product = candidate.product_id,
                    delta = effect.delta,
                    "rule applied"
                );
                delta += effect.delta;
                if let Some(signal) = effect.signal {
                    if !signals.iter().any(|s| s == signal) {
                        signals.push(signal.to_string());
                    }
                }
            }
        }

        signals.truncate(MAX_SIGNALS);
        if signals.is_empty() {
            signals.push("Catalog relevance".to_string());
        }

        let confidence = (0.55 + delta).clamp(0.2, 0.95);
        let verdict = if confidence >= 0.82 {
            MatchVerdict::Strong
        } else if confidence >= 0.7 {
            MatchVerdict::Good
        } else if confidence >= 0.55 {
            MatchVerdict::Possible
        } else {
            MatchVerdict::Weak
        };

        MatchAssessment {
            delta,
            confidence,
            verdict,
            signals,
        }
    }

    /// Score and re-sort fused candidates, returning the final ranked list.
    /// Candidates whose product id is missing from the catalog are dropped.
    pub fn apply(
        &self,
        fused: &[FusedCandidate],
        ctx: &RuleContext<'_>,
        top_k: usize,
    ) -> Vec<RankedRecommendation> {
        let mut scored: Vec<(f32, &FusedCandidate, MatchAssessment)> = fused
            .iter()
            .filter_map(|candidate| {
                let product = self.catalog.get(candidate.product_id)?;
                let assessment = self.assess(candidate, product, ctx);
                Some((candidate.fused_score + assessment.delta, candidate, assessment))
            })
            .collect();

        // Stable sort keeps the fused order for equal final scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (final_score, candidate, assessment))| RankedRecommendation {
                product_id: candidate.product_id,
                rank: i + 1,
                final_score,
                confidence: assessment.confidence,
                verdict: assessment.verdict,
                signals: assessment.signals,
            })
            .collect()
    }
}

struct GenderRule;

impl ScoringRule for GenderRule {
    fn name(&self) -> &'static str {
        "gender"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let wanted = ctx.intent.gender.as_deref()?;
        if product.gender.eq_ignore_ascii_case(wanted) {
            Some(RuleEffect::with_signal(GENDER_MATCH, "Gender match"))
        } else {
            Some(RuleEffect::delta(GENDER_MISMATCH))
        }
    }
}

struct ArticleTypeRule;

impl ScoringRule for ArticleTypeRule {
    fn name(&self) -> &'static str {
        "article-type"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        if ctx.intent.article_types.is_empty() {
            return None;
        }
        let product_article = normalize(&product.article_type);
        let mut partial = false;
        for wanted in &ctx.intent.article_types {
            let wanted = normalize(wanted);
            if wanted == product_article {
                return Some(RuleEffect::with_signal(ARTICLE_EXACT, "Article type match"));
            }
            if product_article.contains(&wanted) || wanted.contains(&product_article) {
                partial = true;
            }
        }
        if partial {
            Some(RuleEffect::with_signal(ARTICLE_PARTIAL, "Related article type"))
        } else {
            Some(RuleEffect::delta(ARTICLE_MISS))
        }
    }
}

struct PrimaryArticleRule;

impl ScoringRule for PrimaryArticleRule {
    fn name(&self) -> &'static str {
        "primary-article"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let primary = ctx.intent.primary_article_type.as_deref()?;
        if product.article_type.eq_ignore_ascii_case(primary) {
            None
        } else {
            Some(RuleEffect::delta(PRIMARY_ARTICLE_CONFLICT))
        }
    }
}

struct ColourRule;

impl ScoringRule for ColourRule {
    fn name(&self) -> &'static str {
        "colour"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let product_colour = normalize(&product.base_colour);
        ctx.intent
            .colors
            .iter()
            .any(|c| {
                let c = normalize(c);
                product_colour == c || product_colour.contains(&c)
            })
            .then(|| RuleEffect::with_signal(COLOUR_MATCH, "Color match"))
    }
}

struct UsageRule;

impl ScoringRule for UsageRule {
    fn name(&self) -> &'static str {
        "usage"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        ctx.intent
            .usages
            .iter()
            .any(|u| product.usage.eq_ignore_ascii_case(u))
            .then(|| RuleEffect::with_signal(USAGE_MATCH, "Occasion fit"))
    }
}

struct SeasonRule;

impl ScoringRule for SeasonRule {
    fn name(&self) -> &'static str {
        "season"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        ctx.intent
            .seasons
            .iter()
            .any(|s| product.season.eq_ignore_ascii_case(s))
            .then(|| RuleEffect::with_signal(SEASON_MATCH, "Season fit"))
    }
}

struct StyleKeywordRule;

impl ScoringRule for StyleKeywordRule {
    fn name(&self) -> &'static str {
        "style-keyword"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        if ctx.intent.style_keywords.is_empty() {
            return None;
        }
        let document = normalize(&product.search_document());
        ctx.intent
            .style_keywords
            .iter()
            .any(|kw| document.contains(&normalize(kw)))
            .then(|| RuleEffect::with_signal(STYLE_KEYWORD_MATCH, "Style match"))
    }
}

struct RecencyRule;

impl ScoringRule for RecencyRule {
    fn name(&self) -> &'static str {
        "recency"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        if !ctx.prefer_newest {
            return None;
        }
        let year = product.year? as f32;
        let freshness = ((year - RECENCY_BASE_YEAR) / RECENCY_SPAN_YEARS).clamp(0.0, 1.0);
        if freshness >= 0.6 {
            Some(RuleEffect::with_signal(
                freshness * RECENCY_WEIGHT,
                "Recent collection",
            ))
        } else {
            Some(RuleEffect::delta(freshness * RECENCY_WEIGHT))
        }
    }
}

struct DifferentArticleRule;

impl ScoringRule for DifferentArticleRule {
    fn name(&self) -> &'static str {
        "pair-different-article"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let anchor = ctx.anchor?;
        if product.article_type.eq_ignore_ascii_case(&anchor.article_type) {
            Some(RuleEffect::delta(PAIR_SAME_ARTICLE))
        } else {
            Some(RuleEffect::with_signal(
                PAIR_DIFFERENT_ARTICLE,
                "Complements the anchor piece",
            ))
        }
    }
}

struct ComplementTokenRule;

impl ScoringRule for ComplementTokenRule {
    fn name(&self) -> &'static str {
        "pair-complement-token"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let anchor = ctx.anchor?;
        let hints = complement_hints(&anchor.article_type)?;
        let document = normalize(&product.search_document());
        hints
            .split_whitespace()
            .any(|token| document.contains(token))
            .then(|| RuleEffect::with_signal(PAIR_COMPLEMENT_TOKEN, "Pairs well together"))
    }
}

struct DifferentMasterCategoryRule;

impl ScoringRule for DifferentMasterCategoryRule {
    fn name(&self) -> &'static str {
        "pair-different-master"
    }

    fn apply(&self, product: &Product, ctx: &RuleContext<'_>) -> Option<RuleEffect> {
        let anchor = ctx.anchor?;
        (!product
            .master_category
            .eq_ignore_ascii_case(&anchor.master_category))
        .then(|| RuleEffect::delta(PAIR_DIFFERENT_MASTER))
    }
}
