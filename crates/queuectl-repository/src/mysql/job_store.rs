//! MySQL job store implementation.

use crate::traits::{lease_deadline, parse_state, zero_filled_counts, JobStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{ExecutionOutcome, Job, JobId, JobState, QueueError, QueueResult, StateFilter};
use sqlx::mysql::MySqlPool;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// MySQL job store.
///
/// Claims lock the candidate row with `FOR UPDATE SKIP LOCKED` inside a
/// transaction, so concurrent workers skip each other's candidates instead
/// of waiting on them.
#[derive(Clone)]
pub struct MySqlJobStore {
    pool: MySqlPool,
}

impl MySqlJobStore {
    /// Creates a new MySQL job store.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: u32,
    max_retries: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    next_try_at: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    processing_expires_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from(row.id),
            command: row.command,
            state: parse_state(&row.state)?,
            attempts: row.attempts,
            max_retries: row.max_retries,
            created_at: row.created_at,
            updated_at: row.updated_at,
            next_try_at: row.next_try_at,
            worker_id: row.worker_id,
            lease_expires_at: row.processing_expires_at,
            exit_code: row.exit_code,
            stdout: row.stdout,
            stderr: row.stderr,
        })
    }
}

#[async_trait]
impl JobStore for MySqlJobStore {
    async fn insert(&self, job: &Job) -> QueueResult<()> {
        debug!(job_id = %job.id, "Inserting job");

        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at,
                              next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(Utc::now())
        .bind(job.next_try_at)
        .bind(job.worker_id.as_deref())
        .bind(job.lease_expires_at)
        .bind(job.exit_code)
        .bind(job.stdout.as_deref())
        .bind(job.stderr.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| match QueueError::from(e) {
            QueueError::Conflict(_) => QueueError::conflict(format!("Job {} already exists", job.id)),
            other => other,
        })?;

        Ok(())
    }

    async fn save(&self, job: &Job) -> QueueResult<()> {
        debug!(job_id = %job.id, state = %job.state, "Saving job");

        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at,
                              next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                state = VALUES(state),
                attempts = VALUES(attempts),
                max_retries = VALUES(max_retries),
                updated_at = VALUES(updated_at),
                next_try_at = VALUES(next_try_at),
                worker_id = VALUES(worker_id),
                processing_expires_at = VALUES(processing_expires_at),
                exit_code = VALUES(exit_code),
                stdout = VALUES(stdout),
                stderr = VALUES(stderr)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(Utc::now())
        .bind(job.next_try_at)
        .bind(job.worker_id.as_deref())
        .bind(job.lease_expires_at)
        .bind(job.exit_code)
        .bind(job.stdout.as_deref())
        .bind(job.stderr.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> QueueResult<Option<Job>> {
        debug!(job_id = %id, "Finding job by id");

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, command, state, attempts, max_retries, created_at, updated_at,
                   next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn claim_next(&self, worker_id: &str, lease: Duration) -> QueueResult<Option<Job>> {
        let now = Utc::now();
        let expires_at = lease_deadline(now, lease)?;

        let mut tx = self.pool.begin().await?;

        let candidate: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM jobs
            WHERE state = 'pending'
              AND (next_try_at IS NULL OR next_try_at <= ?)
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.rollback().await?;
            return Ok(None);
        };

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing',
                worker_id = ?,
                processing_expires_at = ?,
                next_try_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(worker_id)
        .bind(expires_at)
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, command, state, attempts, max_retries, created_at, updated_at,
                   next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Job::try_from(row).map(Some)
    }

    async fn mark_completed(
        &self,
        id: &JobId,
        worker_id: &str,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                exit_code = ?, stdout = ?, stderr = ?,
                next_try_at = NULL, worker_id = NULL, processing_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'processing' AND worker_id = ?
            "#,
        )
        .bind(outcome.exit_code)
        .bind(&outcome.stdout)
        .bind(&outcome.stderr)
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_retry(
        &self,
        id: &JobId,
        worker_id: &str,
        attempts: u32,
        next_try_at: DateTime<Utc>,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = ?, next_try_at = ?,
                exit_code = ?, stdout = ?, stderr = ?,
                worker_id = NULL, processing_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'processing' AND worker_id = ?
            "#,
        )
        .bind(attempts)
        .bind(next_try_at)
        .bind(outcome.exit_code)
        .bind(&outcome.stdout)
        .bind(&outcome.stderr)
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_dead(
        &self,
        id: &JobId,
        worker_id: &str,
        attempts: u32,
        outcome: &ExecutionOutcome,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'dead',
                attempts = ?,
                exit_code = ?, stdout = ?, stderr = ?,
                next_try_at = NULL, worker_id = NULL, processing_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'processing' AND worker_id = ?
            "#,
        )
        .bind(attempts)
        .bind(outcome.exit_code)
        .bind(&outcome.stdout)
        .bind(&outcome.stderr)
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn renew_lease(&self, id: &JobId, worker_id: &str, lease: Duration) -> QueueResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET processing_expires_at = ?, updated_at = ?
            WHERE id = ? AND state = 'processing' AND worker_id = ?
            "#,
        )
        .bind(lease_deadline(now, lease)?)
        .bind(now)
        .bind(id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<u64> {
        // attempts must stay last: MySQL evaluates SET assignments left to right.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = CASE WHEN attempts + 1 >= max_retries THEN 'dead' ELSE 'pending' END,
                next_try_at = CASE WHEN attempts + 1 >= max_retries THEN NULL ELSE ? END,
                worker_id = NULL,
                processing_expires_at = NULL,
                updated_at = ?,
                attempts = attempts + 1
            WHERE state = 'processing' AND processing_expires_at < ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn requeue_dead(&self, id: &JobId) -> QueueResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = 0,
                next_try_at = ?,
                exit_code = NULL, stdout = NULL, stderr = NULL,
                worker_id = NULL, processing_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND state = 'dead'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_state(&self, filter: StateFilter) -> QueueResult<Vec<Job>> {
        debug!(filter = %filter, "Listing jobs");

        let rows = match filter {
            StateFilter::All => {
                sqlx::query_as::<_, JobRow>(
                    r#"
                    SELECT id, command, state, attempts, max_retries, created_at, updated_at,
                           next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr
                    FROM jobs
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            StateFilter::Only(state) => {
                sqlx::query_as::<_, JobRow>(
                    r#"
                    SELECT id, command, state, attempts, max_retries, created_at, updated_at,
                           next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr
                    FROM jobs
                    WHERE state = ?
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_state(&self) -> QueueResult<BTreeMap<JobState, u64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT state, COUNT(*) FROM jobs GROUP BY state",
        )
        .fetch_all(&self.pool)
        .await?;

        zero_filled_counts(rows)
    }

    async fn health_check(&self) -> QueueResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
