//! Runtime settings for workers and the pool, derived from [`AppConfig`].

use crate::retry::RetryPolicy;
use queuectl_config::{AppConfig, WorkerConfig};
use std::time::Duration;

/// Settings shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Sleep between polls when nothing is eligible.
    pub poll_interval: Duration,

    /// Lease granted by a claim and by each renewal.
    pub lease: Duration,

    /// Lease renewal interval while a command runs.
    pub heartbeat_interval: Duration,

    /// Backoff and attempt budget handling.
    pub retry: RetryPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WorkerOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.worker.poll_interval(),
            lease: config.worker.lease(),
            heartbeat_interval: config.worker.heartbeat_interval(),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub count: usize,

    /// Interval between expired-lease sweeps.
    pub sweep_interval: Duration,

    /// Per-worker settings.
    pub worker: WorkerOptions,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WorkerPoolConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            count: config.worker.count,
            sweep_interval: config.worker.sweep_interval(),
            worker: WorkerOptions::from(config),
        }
    }
}

impl WorkerPoolConfig {
    /// Overrides the worker count.
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// Executor settings taken from the worker section.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Shell used as `<shell> -c <command>`.
    pub shell: String,

    /// Kill commands running longer than this.
    pub timeout: Option<Duration>,
}

impl From<&WorkerConfig> for ExecutorOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.command_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_from_app_config() {
        let mut app = AppConfig::default();
        app.worker.count = 3;
        app.worker.lease_secs = 90;
        app.retry.backoff_base = 3;

        let config = WorkerPoolConfig::from(&app);
        assert_eq!(config.count, 3);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.worker.lease, Duration::from_secs(90));
        assert_eq!(config.worker.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.worker.poll_interval, Duration::from_millis(500));
        assert_eq!(config.worker.retry.base(), 3);
    }

    #[test]
    fn test_with_count() {
        assert_eq!(WorkerPoolConfig::default().with_count(8).count, 8);
    }

    #[test]
    fn test_executor_options() {
        let mut worker = WorkerConfig::default();
        worker.command_timeout_secs = Some(5);
        let options = ExecutorOptions::from(&worker);
        assert_eq!(options.shell, "sh");
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }
}
