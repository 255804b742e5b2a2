//! Metrics for job queue monitoring.
//!
//! Recording goes through the `metrics` facade; nothing is exported unless
//! the embedding binary installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use queuectl_core::JobState;
use std::collections::BTreeMap;
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "queuectl_jobs_enqueued_total";
    /// Total jobs claimed by a worker.
    pub const JOBS_CLAIMED_TOTAL: &str = "queuectl_jobs_claimed_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "queuectl_jobs_completed_total";
    /// Total failed attempts scheduled for retry.
    pub const JOBS_RETRIED_TOTAL: &str = "queuectl_jobs_retried_total";
    /// Total jobs moved to the dead letter queue.
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "queuectl_jobs_dead_lettered_total";
    /// Total dead jobs moved back to pending.
    pub const JOBS_REQUEUED_TOTAL: &str = "queuectl_jobs_requeued_total";
    /// Total resolutions refused because the lease was lost.
    pub const JOBS_LEASE_LOST_TOTAL: &str = "queuectl_jobs_lease_lost_total";
    /// Total expired leases reclaimed by the sweeper.
    pub const JOBS_RECLAIMED_TOTAL: &str = "queuectl_jobs_reclaimed_total";

    /// Current jobs per state.
    pub const JOBS_BY_STATE: &str = "queuectl_jobs";

    /// Command execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "queuectl_job_duration_seconds";

    /// Active workers count.
    pub const WORKERS_ACTIVE: &str = "queuectl_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_CLAIMED_TOTAL,
        "Total number of jobs claimed for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_RETRIED_TOTAL,
        "Total number of failed attempts scheduled for retry"
    );
    describe_counter!(
        names::JOBS_DEAD_LETTERED_TOTAL,
        "Total number of jobs sent to dead letter queue"
    );
    describe_counter!(
        names::JOBS_REQUEUED_TOTAL,
        "Total number of dead jobs retried from the dead letter queue"
    );
    describe_counter!(
        names::JOBS_LEASE_LOST_TOTAL,
        "Total number of results discarded because the worker lost its lease"
    );
    describe_counter!(
        names::JOBS_RECLAIMED_TOTAL,
        "Total number of expired leases reclaimed"
    );

    describe_gauge!(names::JOBS_BY_STATE, "Current number of jobs per state");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Command execution duration in seconds"
    );

    describe_gauge!(names::WORKERS_ACTIVE, "Number of active workers");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued() {
        counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
    }

    /// Record a job claimed.
    pub fn job_claimed(worker_id: &str) {
        counter!(
            names::JOBS_CLAIMED_TOTAL,
            "worker_id" => worker_id.to_string()
        )
        .increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL).increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed attempt that will be retried.
    pub fn job_retried(attempt: u32, duration: Duration) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "attempt" => attempt.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job sent to the DLQ.
    pub fn job_dead_lettered(reason: &str) {
        counter!(
            names::JOBS_DEAD_LETTERED_TOTAL,
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Record a dead job retried.
    pub fn job_requeued() {
        counter!(names::JOBS_REQUEUED_TOTAL).increment(1);
    }

    /// Record a result discarded after the lease was lost.
    pub fn lease_lost() {
        counter!(names::JOBS_LEASE_LOST_TOTAL).increment(1);
    }

    /// Record reclaimed leases.
    pub fn leases_reclaimed(count: u64) {
        counter!(names::JOBS_RECLAIMED_TOTAL).increment(count);
    }

    /// Update per-state gauges.
    pub fn update_state_counts(counts: &BTreeMap<JobState, u64>) {
        for (state, count) in counts {
            gauge!(
                names::JOBS_BY_STATE,
                "state" => state.as_str()
            )
            .set(*count as f64);
        }
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update worker count.
    pub fn update_workers(pool_id: &str, active: u64) {
        gauge!(
            names::WORKERS_ACTIVE,
            "pool_id" => pool_id.to_string()
        )
        .set(active as f64);
    }
}
