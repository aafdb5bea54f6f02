use crate::config::Config;
use crate::error::{OutfitterError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_catalog(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_providers(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OutfitterError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_catalog(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked here: the path may contain ~ and the
        // catalog loader reports unreadable files with full context.
        if config.catalog.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "catalog.path",
                "Catalog path cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.candidate_pool == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_pool",
                "Candidate pool must be greater than 0",
            ));
        }

        if config.retrieval.rule_pool_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.rule_pool_multiplier",
                "Rule pool multiplier must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.fusion.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                format!("RRF constant must be positive, got {}", config.fusion.rrf_k),
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.max_depth == 0 {
            errors.push(ValidationError::new(
                "rerank.max_depth",
                "Rerank depth ceiling must be greater than 0",
            ));
        }

        let spread = config.rerank.min_score_spread;
        if !(0.0..=1.0).contains(&spread) {
            errors.push(ValidationError::new(
                "rerank.min_score_spread",
                format!("Score spread must be between 0.0 and 1.0, got {}", spread),
            ));
        }
    }

    fn validate_providers(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.providers.request_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "providers.request_timeout_ms",
                "Request timeout must be greater than 0",
            ));
        }

        if config.providers.request_budget_ms < config.providers.request_timeout_ms {
            errors.push(ValidationError::new(
                "providers.request_budget_ms",
                "Request budget cannot be smaller than the per-call timeout",
            ));
        }

        if config.providers.embedding_model.is_empty() {
            errors.push(ValidationError::new(
                "providers.embedding_model",
                "Embedding model name cannot be empty",
            ));
        }

        if config.providers.rerank_model.is_empty() {
            errors.push(ValidationError::new(
                "providers.rerank_model",
                "Rerank model name cannot be empty",
            ));
        }
    }
}
