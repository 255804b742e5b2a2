//! Application configuration structures.

use queuectl_core::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Job store connection configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry and backoff configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "queuectl".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite://…` or `mysql://…`).
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Minimum connection pool size.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Maximum connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Run embedded migrations on connect.
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            busy_timeout_ms: default_busy_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://queuectl.db".to_string()
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_run_migrations() -> bool {
    true
}

impl DatabaseConfig {
    /// Creates a configuration for the given URL with default pool settings.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the idle timeout as a Duration.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Returns the SQLite busy timeout as a Duration.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Checks if the URL points at SQLite.
    #[must_use]
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Checks if the URL points at MySQL.
    #[must_use]
    pub fn is_mysql(&self) -> bool {
        self.url.starts_with("mysql://")
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers started by `queuectl worker`.
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Sleep between polls of an empty queue, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Lease length granted by a claim, in seconds.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,

    /// Lease renewal interval while a command runs, in seconds.
    /// Defaults to a third of the lease.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,

    /// Interval between expired-lease sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Shell used to run job commands (`<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Optional per-command timeout in seconds.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            poll_interval_ms: default_poll_interval(),
            lease_secs: default_lease(),
            heartbeat_interval_secs: None,
            sweep_interval_secs: default_sweep_interval(),
            shell: default_shell(),
            command_timeout_secs: None,
        }
    }
}

fn default_worker_count() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    500
}

fn default_lease() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_shell() -> String {
    "sh".to_string()
}

impl WorkerConfig {
    /// Returns the poll interval as Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the lease length as Duration.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    /// Returns the heartbeat interval as Duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        match self.heartbeat_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => (self.lease() / 3).max(Duration::from_secs(1)),
        }
    }

    /// Returns the sweep interval as Duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Returns the command timeout as Duration, if any.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Retry and backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt budget for jobs enqueued without one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff (`base ^ attempts` seconds).
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,

    /// Optional upper bound for a single backoff delay, in seconds.
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            max_delay_secs: None,
        }
    }
}

fn default_max_retries() -> u32 {
    queuectl_core::DEFAULT_MAX_RETRIES
}

fn default_backoff_base() -> u32 {
    2
}
