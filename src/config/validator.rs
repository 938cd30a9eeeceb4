use crate::config::{Config, LexicalBackend};
use crate::error::{JurixError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_lexical(config, &mut errors);
        Self::validate_vector(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_compression(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(JurixError::ConfigValidation { errors })
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

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_lexical(config: &Config, errors: &mut Vec<ValidationError>) {
        let lexical = &config.lexical;
        if !lexical.k1.is_finite() || lexical.k1 < 0.0 {
            errors.push(ValidationError::new(
                "lexical.k1",
                format!("k1 must be a non-negative number, got {}", lexical.k1),
            ));
        }

        if !(0.0..=1.0).contains(&lexical.b) {
            errors.push(ValidationError::new(
                "lexical.b",
                format!("b must be between 0.0 and 1.0, got {}", lexical.b),
            ));
        }

        if lexical.backend == LexicalBackend::Tantivy
            && ((lexical.k1 - 1.2).abs() > f32::EPSILON || (lexical.b - 0.75).abs() > f32::EPSILON)
        {
            tracing::warn!("lexical.k1 and lexical.b are ignored by the tantivy backend");
        }
    }

    fn validate_vector(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.vector.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.vector.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.vector.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        for (path, weight) in [
            ("retrieval.semantic_weight", retrieval.semantic_weight),
            ("retrieval.lexical_weight", retrieval.lexical_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }

        if retrieval.semantic_weight == 0.0 && retrieval.lexical_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval",
                "semantic_weight and lexical_weight cannot both be 0",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("rrf_k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if !(-1.0..=1.0).contains(&retrieval.min_semantic_score) {
            errors.push(ValidationError::new(
                "retrieval.min_semantic_score",
                format!(
                    "min_semantic_score must be between -1.0 and 1.0, got {}",
                    retrieval.min_semantic_score
                ),
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.depth == 0 {
            errors.push(ValidationError::new(
                "rerank.depth",
                "Rerank depth must be greater than 0",
            ));
        }

        if config.rerank.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_ms",
                "Rerank timeout must be greater than 0",
            ));
        }
    }

    fn validate_compression(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.compression.duplicate_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            errors.push(ValidationError::new(
                "compression.duplicate_threshold",
                format!(
                    "Duplicate threshold must be in (0.0, 1.0], got {}",
                    threshold
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = Config::default();
        config.retrieval.semantic_weight = 0.0;
        config.retrieval.lexical_weight = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.lexical.b = 1.5;
        config.retrieval.top_k = 0;
        config.compression.duplicate_threshold = 0.0;

        match ConfigValidator::validate(&config) {
            Err(JurixError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec![
                        "lexical.b",
                        "retrieval.top_k",
                        "compression.duplicate_threshold"
                    ]
                );
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
