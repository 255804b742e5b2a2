//! Expired-lease recovery.

use crate::metrics::JobMetrics;
use chrono::Utc;
use queuectl_core::QueueResult;
use queuectl_repository::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Returns jobs whose worker stopped renewing its lease to the queue.
///
/// Each reclaimed job is charged one attempt and goes back to pending, or to
/// the DLQ when that exhausts its budget.
pub struct LeaseSweeper {
    store: Arc<dyn JobStore>,
    interval: Duration,
}

impl LeaseSweeper {
    /// Creates a sweeper that runs every `interval`.
    pub fn new(store: Arc<dyn JobStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Reclaims every lease expired as of now.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the reclaim.
    pub async fn sweep_once(&self) -> QueueResult<u64> {
        let reclaimed = self.store.reclaim_expired(Utc::now()).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "Reclaimed jobs with expired leases");
            JobMetrics::leases_reclaimed(reclaimed);
        } else {
            debug!("No expired leases");
        }
        Ok(reclaimed)
    }

    /// Sweeps immediately, then every interval until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Lease sweeper started");

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Lease sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Lease sweeper stopped");
    }
}
