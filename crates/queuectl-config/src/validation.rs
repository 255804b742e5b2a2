//! Configuration validation module.
//!
//! Rejects unusable configuration at load time rather than when the first
//! worker starts.

use crate::{AppConfig, DatabaseConfig, RetryConfig, WorkerConfig};
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Pool size configuration is invalid (min must be <= max).
    InvalidPoolSize { min: u32, max: u32 },
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: u32, maximum: u32 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Timeout or interval must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Worker count must be at least one.
    InvalidWorkerCount { value: usize },
    /// Shell must be a non-empty program name.
    EmptyShell,
    /// Attempt budget must be at least one.
    InvalidMaxRetries { value: u32 },
    /// Backoff base must be at least one.
    InvalidBackoffBase { value: u32 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPoolSize { min, max } => {
                write!(
                    f,
                    "Invalid pool size: min ({}) cannot be greater than max ({})",
                    min, max
                )
            }
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {} exceeds maximum allowed ({})", value, maximum)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::InvalidWorkerCount { value } => {
                write!(f, "Worker count must be at least 1, got {}", value)
            }
            Self::EmptyShell => write!(f, "worker.shell cannot be empty"),
            Self::InvalidMaxRetries { value } => {
                write!(f, "retry.max_retries must be at least 1, got {}", value)
            }
            Self::InvalidBackoffBase { value } => {
                write!(f, "retry.backoff_base must be at least 1, got {}", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: u32 = 1000;

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_database(&config.database, &mut result);
        Self::validate_worker(&config.worker, &mut result);
        Self::validate_retry(&config.retry, &mut result);

        result.into_result()
    }

    fn validate_database(config: &DatabaseConfig, result: &mut ValidationResult) {
        if config.url.is_empty() {
            result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "database".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        } else if config.is_mysql() {
            if let Err(e) = Url::parse(&config.url) {
                result.add_error(ConfigValidationError::InvalidUrl {
                    url_type: "database".to_string(),
                    message: e.to_string(),
                });
            }
        } else if !config.is_sqlite() {
            result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "database".to_string(),
                message: "URL must start with sqlite: or mysql://".to_string(),
            });
        }

        if config.min_connections > config.max_connections {
            result.add_error(ConfigValidationError::InvalidPoolSize {
                min: config.min_connections,
                max: config.max_connections,
            });
        }
        if config.max_connections > Self::MAX_POOL_SIZE {
            result.add_error(ConfigValidationError::PoolSizeTooLarge {
                value: config.max_connections,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        if config.connect_timeout_secs == 0 {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "database.connect_timeout_secs".to_string(),
                value: 0,
            });
        }
    }

    fn validate_worker(config: &WorkerConfig, result: &mut ValidationResult) {
        if config.count == 0 {
            result.add_error(ConfigValidationError::InvalidWorkerCount { value: 0 });
        }
        if config.shell.trim().is_empty() {
            result.add_error(ConfigValidationError::EmptyShell);
        }

        let intervals = [
            ("worker.poll_interval_ms", config.poll_interval_ms),
            ("worker.lease_secs", config.lease_secs),
            ("worker.sweep_interval_secs", config.sweep_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                result.add_error(ConfigValidationError::NonPositiveTimeout {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if config.heartbeat_interval_secs == Some(0) {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "worker.heartbeat_interval_secs".to_string(),
                value: 0,
            });
        }
        if config.command_timeout_secs == Some(0) {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "worker.command_timeout_secs".to_string(),
                value: 0,
            });
        }
    }

    fn validate_retry(config: &RetryConfig, result: &mut ValidationResult) {
        if config.max_retries == 0 {
            result.add_error(ConfigValidationError::InvalidMaxRetries { value: 0 });
        }
        if config.backoff_base == 0 {
            result.add_error(ConfigValidationError::InvalidBackoffBase { value: 0 });
        }
    }
}
