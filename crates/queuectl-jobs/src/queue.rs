//! Job queue facade used by the CLI.

use crate::dlq::DlqController;
use crate::metrics::JobMetrics;
use queuectl_core::{Job, JobId, JobSpec, JobState, QueueError, QueueResult, StateFilter};
use queuectl_repository::JobStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Entry point for enqueueing and inspecting jobs.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    default_max_retries: u32,
}

impl JobQueue {
    /// Creates a queue over `store`. Jobs enqueued without a budget get
    /// `default_max_retries`.
    pub fn new(store: Arc<dyn JobStore>, default_max_retries: u32) -> Self {
        Self {
            store,
            default_max_retries,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Returns a DLQ controller over the same store.
    pub fn dlq(&self) -> DlqController {
        DlqController::new(self.store.clone())
    }

    /// Enqueues a job as pending.
    ///
    /// # Errors
    ///
    /// `Validation` for an invalid spec, `Conflict` if the id is taken, or a
    /// storage error.
    pub async fn enqueue(&self, spec: JobSpec) -> QueueResult<Job> {
        let job = spec.into_job(self.default_max_retries)?;
        self.store.insert(&job).await?;

        info!(job_id = %job.id, max_retries = job.max_retries, "Job enqueued");
        JobMetrics::job_enqueued();
        Ok(job)
    }

    /// Parses a JSON job spec and enqueues it.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON, otherwise as [`JobQueue::enqueue`].
    pub async fn enqueue_json(&self, json: &str) -> QueueResult<Job> {
        self.enqueue(JobSpec::from_json(json)?).await
    }

    /// Fetches one job.
    ///
    /// # Errors
    ///
    /// `NotFound` if no job has this id.
    pub async fn get(&self, id: &JobId) -> QueueResult<Job> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))
    }

    /// Lists jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the listing.
    pub async fn list(&self, filter: StateFilter) -> QueueResult<Vec<Job>> {
        self.store.list_by_state(filter).await
    }

    /// Counts jobs per state; every state is present.
    ///
    /// # Errors
    ///
    /// Returns the storage error from the count.
    pub async fn status(&self) -> QueueResult<BTreeMap<JobState, u64>> {
        let counts = self.store.count_by_state().await?;
        JobMetrics::update_state_counts(&counts);
        Ok(counts)
    }
}
