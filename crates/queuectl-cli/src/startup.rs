//! Worker startup and shutdown utilities.

use queuectl_config::AppConfig;
use tokio::signal;
use tracing::{error, info};

/// Logs the effective worker settings.
pub fn print_startup_info(config: &AppConfig, backend: &str, workers: usize) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Environment: {}", config.app.environment);
    info!("Database:    {}", backend);
    info!("Workers:     {}", workers);
    info!(
        "Lease:       {}s (heartbeat every {}s)",
        config.worker.lease_secs,
        config.worker.heartbeat_interval().as_secs()
    );
    info!(
        "Retry:       max {} attempts, backoff base {}",
        config.retry.max_retries, config.retry.backoff_base
    );
    info!("{}", separator);
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight jobs...");
        }
        () = terminate => {
            info!("Received terminate signal, finishing in-flight jobs...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_startup_info_does_not_panic() {
        print_startup_info(&AppConfig::default(), "sqlite", 4);
    }
}
