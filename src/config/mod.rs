//! Configuration management for the Outfitter engine
//!
//! Loads a TOML file, applies environment overrides, and validates every
//! section before the engine is allowed to start. Retrieval behavior (pool
//! sizes, fusion constant, rerank depth, provider timeouts) is entirely
//! configuration-driven so deployments can tune latency without code changes.

use crate::error::{OutfitterError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub catalog: CatalogConfig,
    pub retrieval: RetrievalConfig,
    pub fusion: FusionConfig,
    pub rerank: RerankConfig,
    pub intent: IntentConfig,
    pub providers: ProviderConfig,
    pub rules: RulesConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Catalog source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON-lines file with one product record (including embedding) per line
    pub path: PathBuf,
}

/// Candidate generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate pool size per generator (lexical and dense)
    pub candidate_pool: usize,
    /// Multiplier applied to `top_k` to size the pool handed to business rules
    pub rule_pool_multiplier: usize,
    /// Minimum token length considered by the lexical scorer
    pub min_token_len: usize,
}

/// Rank fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// RRF smoothing constant (typically 60)
    pub rrf_k: f32,
}

/// Adaptive reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Ceiling on how many fused candidates are sent to the rerank provider
    pub max_depth: usize,
    /// Intent fields required before a query counts as unambiguous
    pub strong_signal_fields: usize,
    /// Minimum relative fused-score spread over the head of the list for the
    /// fused order to count as well separated
    pub min_score_spread: f32,
}

/// Intent extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Below this many populated fields the external extractor is consulted
    pub enrichment_threshold: usize,
}

/// External provider configuration (timeouts and model names)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Per-call timeout for any single provider request, in milliseconds
    pub request_timeout_ms: u64,
    /// Overall budget for one retrieve() call, in milliseconds
    pub request_budget_ms: u64,
    pub embedding_model: String,
    pub rerank_model: String,
}

/// Business rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Apply the small recency boost favoring recent collection years
    pub prefer_newest: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OutfitterError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| OutfitterError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| OutfitterError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: OUTFITTER_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("OUTFITTER_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        // Simple implementation for common overrides
        match path {
            "CATALOG__PATH" => {
                self.catalog.path = PathBuf::from(value);
            }
            "RETRIEVAL__CANDIDATE_POOL" => {
                self.retrieval.candidate_pool = parse_env(path, value)?;
            }
            "RERANK__ENABLED" => {
                self.rerank.enabled = parse_env(path, value)?;
            }
            "RERANK__MAX_DEPTH" => {
                self.rerank.max_depth = parse_env(path, value)?;
            }
            "PROVIDERS__REQUEST_TIMEOUT_MS" => {
                self.providers.request_timeout_ms = parse_env(path, value)?;
            }
            "PROVIDERS__REQUEST_BUDGET_MS" => {
                self.providers.request_budget_ms = parse_env(path, value)?;
            }
            "PROVIDERS__EMBEDDING_MODEL" => {
                self.providers.embedding_model = value.to_string();
            }
            "PROVIDERS__RERANK_MODEL" => {
                self.providers.rerank_model = value.to_string();
            }
            "RULES__PREFER_NEWEST" => {
                self.rules.prefer_newest = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            OutfitterError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("outfitter").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| OutfitterError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            catalog: CatalogConfig {
                path: PathBuf::from("data/catalog.jsonl"),
            },
            retrieval: RetrievalConfig {
                candidate_pool: 180,
                rule_pool_multiplier: 8,
                min_token_len: 3,
            },
            fusion: FusionConfig { rrf_k: 60.0 },
            rerank: RerankConfig {
                enabled: true,
                max_depth: 64,
                strong_signal_fields: 3,
                min_score_spread: 0.15,
            },
            intent: IntentConfig {
                enrichment_threshold: 2,
            },
            providers: ProviderConfig {
                request_timeout_ms: 20_000,
                request_budget_ms: 25_000,
                embedding_model: "all-MiniLM-L6-v2".to_string(),
                rerank_model: "bge-reranker-base".to_string(),
            },
            rules: RulesConfig { prefer_newest: true },
        }
    }
}
