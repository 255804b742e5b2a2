//! Job store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{ExecutionOutcome, Job, JobId, JobState, QueueError, QueueResult, StateFilter};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Durable job table.
///
/// Every state transition of a job goes through one of these operations.
/// Resolve writes (`mark_*`) and lease renewal are guarded by the lease
/// holder: they return `false` without touching the row when `worker_id` no
/// longer owns it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job. Fails with [`QueueError::Conflict`] if the id exists.
    async fn insert(&self, job: &Job) -> QueueResult<()>;

    /// Upserts a job by id.
    ///
    /// On conflict only mutable fields are refreshed; `command` and
    /// `created_at` are never overwritten.
    async fn save(&self, job: &Job) -> QueueResult<()>;

    /// Finds a job by id.
    async fn find_by_id(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Atomically claims the oldest eligible pending job for `worker_id`.
    ///
    /// Returns `None` when nothing is eligible. No two concurrent callers
    /// ever receive the same job.
    async fn claim_next(&self, worker_id: &str, lease: Duration) -> QueueResult<Option<Job>>;

    /// Resolves a claimed job as completed.
    async fn mark_completed(
        &self,
        id: &JobId,
        worker_id: &str,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool>;

    /// Returns a claimed job to pending, eligible again at `next_try_at`.
    async fn mark_retry(
        &self,
        id: &JobId,
        worker_id: &str,
        attempts: u32,
        next_try_at: DateTime<Utc>,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool>;

    /// Moves a claimed job to the dead-letter queue.
    async fn mark_dead(
        &self,
        id: &JobId,
        worker_id: &str,
        attempts: u32,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool>;

    /// Extends the lease of a job still held by `worker_id`.
    async fn renew_lease(&self, id: &JobId, worker_id: &str, lease: Duration) -> QueueResult<bool>;

    /// Treats every processing job whose lease expired before `now` as a
    /// failed attempt. Returns the number of rows reclaimed.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<u64>;

    /// Moves a dead job back to pending with a fresh attempt budget.
    ///
    /// Returns `false` when the job is missing or not dead.
    async fn requeue_dead(&self, id: &JobId) -> QueueResult<bool>;

    /// Lists jobs matching `filter`, newest first.
    async fn list_by_state(&self, filter: StateFilter) -> QueueResult<Vec<Job>>;

    /// Counts jobs per state. Every state is present.
    async fn count_by_state(&self) -> QueueResult<BTreeMap<JobState, u64>>;

    /// Checks that the backing database answers.
    async fn health_check(&self) -> QueueResult<()>;

    /// Closes the underlying connections.
    async fn close(&self);
}

/// Computes `now + lease`.
pub(crate) fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> QueueResult<DateTime<Utc>> {
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| QueueError::validation(format!("Lease out of range: {}", e)))?;
    now.checked_add_signed(lease)
        .ok_or_else(|| QueueError::validation("Lease out of range"))
}

/// Builds a zero-filled count map from `(state, count)` rows.
pub(crate) fn zero_filled_counts<I>(rows: I) -> QueueResult<BTreeMap<JobState, u64>>
where
    I: IntoIterator<Item = (String, i64)>,
{
    let mut counts: BTreeMap<JobState, u64> = JobState::all().into_iter().map(|s| (s, 0)).collect();
    for (state, count) in rows {
        counts.insert(parse_state(&state)?, u64::try_from(count).unwrap_or(0));
    }
    Ok(counts)
}

pub(crate) fn parse_state(value: &str) -> QueueResult<JobState> {
    JobState::from_str(value)
        .map_err(|_| QueueError::internal(format!("Unknown job state in database: {}", value)))
}
