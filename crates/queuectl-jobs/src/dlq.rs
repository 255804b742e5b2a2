//! Dead letter queue operations.

use crate::metrics::JobMetrics;
use queuectl_core::{Job, JobId, JobState, QueueError, QueueResult, StateFilter};
use queuectl_repository::JobStore;
use std::sync::Arc;
use tracing::info;

/// Operator access to dead jobs.
#[derive(Clone)]
pub struct DlqController {
    store: Arc<dyn JobStore>,
}

impl DlqController {
    /// Creates a controller over `store`.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Lists dead jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the listing.
    pub async fn list(&self) -> QueueResult<Vec<Job>> {
        self.store.list_by_state(StateFilter::Only(JobState::Dead)).await
    }

    /// Moves a dead job back to pending with a fresh attempt budget.
    ///
    /// Returns `false` without changing anything if the job does not exist
    /// or is not dead.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the update.
    pub async fn retry(&self, id: &JobId) -> QueueResult<bool> {
        let requeued = self.store.requeue_dead(id).await?;
        if requeued {
            info!(job_id = %id, "Dead job requeued");
            JobMetrics::job_requeued();
        }
        Ok(requeued)
    }

    /// Like [`DlqController::retry`], but reports why nothing happened.
    ///
    /// # Errors
    ///
    /// `NotFound` if the job does not exist, `InvalidState` if it is not
    /// dead, or a storage error.
    pub async fn requeue(&self, id: &JobId) -> QueueResult<Job> {
        if self.retry(id).await? {
            return self
                .store
                .find_by_id(id)
                .await?
                .ok_or_else(|| QueueError::not_found(id));
        }

        match self.store.find_by_id(id).await? {
            None => Err(QueueError::not_found(id)),
            Some(job) => Err(QueueError::InvalidState {
                expected: JobState::Dead.to_string(),
                actual: job.state.to_string(),
            }),
        }
    }
}
