//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use queuectl_core::{QueueError, QueueResult};
use std::path::PathBuf;
use tracing::debug;

/// Environment variable selecting the environment-specific config file.
pub const ENVIRONMENT_VAR: &str = "QUEUECTL_ENVIRONMENT";

/// Loads [`AppConfig`] from layered sources.
///
/// Configuration is loaded from multiple sources in order:
/// 1. `{dir}/default.toml` - Default values
/// 2. `{dir}/{environment}.toml` - Environment-specific overrides
/// 3. `{dir}/local.toml` - Local overrides (not committed)
/// 4. Environment variables with `QUEUECTL_` prefix (`QUEUECTL_WORKER__COUNT=4`)
/// 5. Explicit overrides set on the loader (command-line flags)
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    environment: Option<String>,
    database_url: Option<String>,
    load_dotenv: bool,
}

impl ConfigLoader {
    /// Creates a loader reading files from `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            environment: None,
            database_url: None,
            load_dotenv: true,
        }
    }

    /// Forces the environment name instead of reading `QUEUECTL_ENVIRONMENT`.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Overrides `database.url` after all other sources.
    #[must_use]
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        self.database_url = url;
        self
    }

    /// Skips loading a `.env` file.
    #[must_use]
    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    /// Returns the config files that exist for `environment`, lowest
    /// precedence first.
    ///
    /// `load` usually runs before logging is set up, so callers log these
    /// once the subscriber is installed.
    pub fn layer_files(&self, environment: &str) -> Vec<PathBuf> {
        ["default", environment, "local"]
            .into_iter()
            .map(|name| self.config_dir.join(format!("{}.toml", name)))
            .filter(|path| path.exists())
            .collect()
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> QueueResult<AppConfig> {
        if self.load_dotenv {
            if let Err(e) = dotenvy::dotenv() {
                debug!("No .env file found or error loading it: {}", e);
            }
        }

        let environment = self
            .environment
            .clone()
            .or_else(|| std::env::var(ENVIRONMENT_VAR).ok())
            .unwrap_or_else(|| "development".to_string());

        debug!(environment = %environment, dir = %self.config_dir.display(), "Loading configuration");

        let mut builder = Config::builder();

        for path in self.layer_files(&environment) {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("QUEUECTL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder = builder
            .set_override("app.environment", environment.clone())
            .map_err(config_error_to_queue_error)?;

        if let Some(url) = &self.database_url {
            builder = builder
                .set_override("database.url", url.clone())
                .map_err(config_error_to_queue_error)?;
        }

        let app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_queue_error)?;

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            QueueError::configuration(messages.join("; "))
        })?;

        Ok(app_config)
    }
}

fn config_error_to_queue_error(err: ConfigError) -> QueueError {
    QueueError::configuration(err.to_string())
}
