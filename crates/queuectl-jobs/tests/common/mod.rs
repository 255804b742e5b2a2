//! Shared fixtures for worker runtime tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_config::DatabaseConfig;
use queuectl_core::{ExecutionOutcome, Job, JobId, JobState, QueueError, QueueResult, StateFilter};
use queuectl_jobs::{RetryPolicy, WorkerOptions};
use queuectl_repository::{DatabasePool, JobStore};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Migrated SQLite database in a temporary directory.
pub struct TestDatabase {
    _dir: TempDir,
    pool: DatabasePool,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());

        let mut config = DatabaseConfig::with_url(url);
        config.max_connections = 8;

        let pool = DatabasePool::new(&config)
            .await
            .expect("Failed to open SQLite database");

        Self { _dir: dir, pool }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.pool.job_store()
    }
}

/// Worker options with short intervals for tests.
pub fn fast_options() -> WorkerOptions {
    WorkerOptions {
        poll_interval: Duration::from_millis(20),
        lease: Duration::from_secs(30),
        heartbeat_interval: Duration::from_secs(10),
        retry: RetryPolicy::exponential(2),
    }
}

/// A store whose every operation fails, counting claim attempts.
#[derive(Default)]
pub struct UnavailableStore {
    pub claims: AtomicU64,
}

impl UnavailableStore {
    pub fn claims(&self) -> u64 {
        self.claims.load(Ordering::SeqCst)
    }

    fn error() -> QueueError {
        QueueError::Database("connection refused".to_string())
    }
}

#[async_trait]
impl JobStore for UnavailableStore {
    async fn insert(&self, _job: &Job) -> QueueResult<()> {
        Err(Self::error())
    }

    async fn save(&self, _job: &Job) -> QueueResult<()> {
        Err(Self::error())
    }

    async fn find_by_id(&self, _id: &JobId) -> QueueResult<Option<Job>> {
        Err(Self::error())
    }

    async fn claim_next(&self, _worker_id: &str, _lease: Duration) -> QueueResult<Option<Job>> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Err(Self::error())
    }

    async fn mark_completed(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        Err(Self::error())
    }

    async fn mark_retry(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _attempts: u32,
        _next_try_at: DateTime<Utc>,
        _outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        Err(Self::error())
    }

    async fn mark_dead(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _attempts: u32,
        _outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        Err(Self::error())
    }

    async fn renew_lease(&self, _id: &JobId, _worker_id: &str, _lease: Duration) -> QueueResult<bool> {
        Err(Self::error())
    }

    async fn reclaim_expired(&self, _now: DateTime<Utc>) -> QueueResult<u64> {
        Err(Self::error())
    }

    async fn requeue_dead(&self, _id: &JobId) -> QueueResult<bool> {
        Err(Self::error())
    }

    async fn list_by_state(&self, _filter: StateFilter) -> QueueResult<Vec<Job>> {
        Err(Self::error())
    }

    async fn count_by_state(&self) -> QueueResult<BTreeMap<JobState, u64>> {
        Err(Self::error())
    }

    async fn health_check(&self) -> QueueResult<()> {
        Err(Self::error())
    }

    async fn close(&self) {}
}
