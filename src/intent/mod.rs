//! Structured shopper intent
//!
//! An `Intent` is the engine's interpretation of what the shopper is looking
//! for: gender, article types, colours, occasion, season, plus residual
//! style keywords. Intents are derived heuristically (and optionally
//! enriched by an external extraction model), then cached by normalized
//! query text for the lifetime of the process.

use crate::catalog::CatalogIndex;
use crate::provider::IntentOverlay;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

mod extractor;

pub use extractor::IntentExtractor;
pub(crate) use extractor::GENERIC_KEYWORDS;

/// Structured interpretation of a shopper's query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub gender: Option<String>,
    /// Article-type hints in confidence order (strongest first)
    pub article_types: Vec<String>,
    /// Selected primary article type, set for image-derived intents to
    /// prevent category drift; conflicting candidates are penalized hard
    pub primary_article_type: Option<String>,
    pub colors: Vec<String>,
    pub usages: Vec<String>,
    pub seasons: Vec<String>,
    pub style_keywords: Vec<String>,
}

impl Intent {
    /// Number of confidently populated fields; drives external-enrichment
    /// and rerank-skip decisions
    pub fn populated_fields(&self) -> usize {
        let mut count = 0;
        if self.gender.is_some() {
            count += 1;
        }
        if !self.article_types.is_empty() {
            count += 1;
        }
        if !self.colors.is_empty() {
            count += 1;
        }
        if !self.usages.is_empty() {
            count += 1;
        }
        if !self.seasons.is_empty() {
            count += 1;
        }
        count
    }

    /// Merge an external extraction result on top of this intent. Overlay
    /// values win for gender; list fields are unioned preserving order.
    pub fn merge_overlay(&mut self, overlay: IntentOverlay) {
        if let Some(gender) = non_placeholder(overlay.gender) {
            self.gender = Some(gender);
        }
        extend_dedup(&mut self.article_types, overlay.article_types);
        extend_dedup(&mut self.colors, overlay.colors);
        if let Some(usage) = non_placeholder(overlay.usage) {
            extend_dedup(&mut self.usages, vec![usage]);
        }
        if let Some(season) = non_placeholder(overlay.season) {
            extend_dedup(&mut self.seasons, vec![season]);
        }
        extend_dedup(&mut self.style_keywords, overlay.style_keywords);
    }

    /// Pick the primary article type for multi-type intents.
    ///
    /// Deterministic rule: highest vision confidence wins (hints are stored
    /// in confidence order); confidence ties break by catalog frequency
    /// descending, then lexicographically.
    pub fn select_primary_article(
        &mut self,
        catalog: &CatalogIndex,
        confidences: &[f32],
    ) {
        if self.article_types.len() < 2 {
            self.primary_article_type = self.article_types.first().cloned();
            return;
        }

        let top_confidence = confidences.first().copied().unwrap_or(1.0);
        let mut tied: Vec<&String> = self
            .article_types
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let c = confidences.get(*i).copied().unwrap_or_else(|| {
                    // Without explicit confidences only the first hint ties
                    if *i == 0 { top_confidence } else { f32::NEG_INFINITY }
                });
                (c - top_confidence).abs() < f32::EPSILON
            })
            .map(|(_, name)| name)
            .collect();

        tied.sort_by(|a, b| {
            catalog
                .article_type_frequency(b)
                .cmp(&catalog.article_type_frequency(a))
                .then_with(|| a.cmp(b))
        });

        self.primary_article_type = tied.first().map(|s| s.to_string());
    }
}

fn non_placeholder(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !matches!(v.to_lowercase().as_str(), "unknown" | "all"))
}

/// Append values, deduplicating case-insensitively while preserving order
pub(crate) fn extend_dedup(target: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        let cleaned = value.trim();
        if cleaned.is_empty() {
            continue;
        }
        if target.iter().any(|v| v.eq_ignore_ascii_case(cleaned)) {
            continue;
        }
        target.push(cleaned.to_string());
    }
}

/// Attributes produced by an external vision provider for an uploaded image.
/// The engine never calls the vision provider itself; it only consumes this
/// summary as an intent seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionSummary {
    #[serde(default)]
    pub gender: Option<String>,
    /// Detected article types, highest confidence first
    #[serde(default)]
    pub article_types: Vec<String>,
    /// Per-label confidences parallel to `article_types` (may be empty)
    #[serde(default)]
    pub confidences: Vec<f32>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub style_keywords: Vec<String>,
    /// Candidate search queries synthesized by the vision model
    #[serde(default)]
    pub search_queries: Vec<String>,
}

/// Append-only intent cache keyed by normalized query text.
///
/// Entries are immutable once computed and never evicted within a process
/// lifetime. Injectable so tests can construct isolated instances and
/// assert hits/misses directly.
#[derive(Default)]
pub struct IntentCache {
    entries: Mutex<AHashMap<String, Arc<Intent>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl IntentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Intent>> {
        let entries = self.entries.lock().expect("intent cache poisoned");
        match entries.get(key) {
            Some(intent) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(intent))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, intent: Intent) -> Arc<Intent> {
        let mut entries = self.entries.lock().expect("intent cache poisoned");
        let value = Arc::new(intent);
        entries.entry(key).or_insert_with(|| Arc::clone(&value));
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("intent cache poisoned").len()
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
