//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, EmbeddingProviderKind, StoreBackend};

const QUERY_MODES: [&str; 3] = ["hybrid", "vector", "keyword"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_embedding(config, &mut result);
        Self::validate_retriever(config, &mut result);
        Self::validate_keyword(config, &mut result);
        Self::validate_snapshot(config, &mut result);
        Self::validate_ingest(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }
        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        if config.store.backend == StoreBackend::Sqlite
            && config.store.path.as_os_str().is_empty()
        {
            result.add_error(ValidationError::new(
                "store.path",
                "SQLite backend requires a database path",
            ));
        }

        if config.store.change_log_capacity == 0 {
            result.add_warning(ValidationWarning::new(
                "store.change_log_capacity",
                "change log disabled, every snapshot rebuild will rescan the whole store",
            ));
        }
    }

    fn validate_embedding(config: &Config, result: &mut ValidationResult) {
        let embedding = &config.embedding;

        if embedding.dimension == 0 {
            result.add_error(ValidationError::new(
                "embedding.dimension",
                "dimension must be greater than 0",
            ));
        }

        if embedding.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "embedding.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if embedding.provider == EmbeddingProviderKind::Openai {
            if embedding.api_key.is_none() {
                result.add_warning(ValidationWarning::new(
                    "embedding.api_key",
                    "API key is not set, may need to be set via environment variable",
                ));
            }
            if !embedding.base_url.starts_with("http://")
                && !embedding.base_url.starts_with("https://")
            {
                result.add_error(ValidationError::new(
                    "embedding.base_url",
                    "base_url must start with http:// or https://",
                ));
            }
        }
    }

    fn validate_retriever(config: &Config, result: &mut ValidationResult) {
        let retriever = &config.retriever;

        if retriever.default_top_k == 0 {
            result.add_error(ValidationError::new(
                "retriever.default_top_k",
                "default_top_k must be greater than 0",
            ));
        }
        if retriever.fetch_multiplier == 0 {
            result.add_error(ValidationError::new(
                "retriever.fetch_multiplier",
                "fetch_multiplier must be at least 1",
            ));
        }
        if retriever.rrf_k.is_nan() || retriever.rrf_k <= 0.0 {
            result.add_error(ValidationError::new(
                "retriever.rrf_k",
                "rrf_k must be positive",
            ));
        }
        if !QUERY_MODES.contains(&retriever.default_mode.to_ascii_lowercase().as_str()) {
            result.add_error(ValidationError::new(
                "retriever.default_mode",
                format!(
                    "Unknown query mode '{}', valid values: {:?}",
                    retriever.default_mode, QUERY_MODES
                ),
            ));
        }
    }

    fn validate_keyword(config: &Config, result: &mut ValidationResult) {
        let keyword = &config.keyword;

        if keyword.k1.is_nan() || keyword.k1 < 0.0 {
            result.add_error(ValidationError::new("keyword.k1", "k1 must be non-negative"));
        }
        if keyword.b.is_nan() || !(0.0..=1.0).contains(&keyword.b) {
            result.add_error(ValidationError::new("keyword.b", "b must be within [0, 1]"));
        }

        for word in &keyword.stopwords {
            if keyword.allowlist.contains(word) {
                result.add_warning(ValidationWarning::new(
                    "keyword",
                    format!("'{}' is both allowed and a stopword; it will be dropped", word),
                ));
            }
        }
    }

    fn validate_snapshot(config: &Config, result: &mut ValidationResult) {
        if config.snapshot.max_sync_rebuild_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "snapshot.max_sync_rebuild_ms",
                "strict queries will never wait for a rebuild and will always be flagged stale",
            ));
        }

        let threshold = config.vector.vacuum_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            result.add_error(ValidationError::new(
                "vector.vacuum_threshold",
                "vacuum_threshold must be within (0, 1]",
            ));
        }
    }

    fn validate_ingest(config: &Config, result: &mut ValidationResult) {
        let ingest = &config.ingest;

        if ingest.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "ingest.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if ingest.initial_backoff_ms > ingest.max_backoff_ms {
            result.add_warning(ValidationWarning::new(
                "ingest.initial_backoff_ms",
                "initial backoff exceeds max_backoff_ms and will be capped",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) && !level.contains('=') {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!("Unknown log level '{}', falling back to info", config.logging.level),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
