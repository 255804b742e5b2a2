//! SQLite job store implementation.

use crate::traits::{lease_deadline, parse_state, zero_filled_counts, JobStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{ExecutionOutcome, Job, JobId, JobState, QueueError, QueueResult, StateFilter};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// SQLite job store.
///
/// The claim is a single `UPDATE … RETURNING` whose subquery picks the oldest
/// eligible row; SQLite runs the statement under its database write lock, and
/// the `state = 'pending'` guard turns it into a compare-and-swap.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Creates a new SQLite job store.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    next_try_at: Option<i64>,
    worker_id: Option<String>,
    processing_expires_at: Option<i64>,
    exit_code: Option<i64>,
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
            attempts: to_u32(row.attempts)?,
            max_retries: to_u32(row.max_retries)?,
            created_at: from_micros(row.created_at)?,
            updated_at: from_micros(row.updated_at)?,
            next_try_at: row.next_try_at.map(from_micros).transpose()?,
            worker_id: row.worker_id,
            lease_expires_at: row.processing_expires_at.map(from_micros).transpose()?,
            exit_code: row
                .exit_code
                .map(|code| {
                    i32::try_from(code)
                        .map_err(|_| QueueError::internal(format!("Exit code out of range: {}", code)))
                })
                .transpose()?,
            stdout: row.stdout,
            stderr: row.stderr,
        })
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(value: i64) -> QueueResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| QueueError::internal(format!("Invalid timestamp in database: {}", value)))
}

fn to_u32(value: i64) -> QueueResult<u32> {
    u32::try_from(value).map_err(|_| QueueError::internal(format!("Counter out of range: {}", value)))
}

#[async_trait]
impl JobStore for SqliteJobStore {
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
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(to_micros(job.created_at))
        .bind(to_micros(Utc::now()))
        .bind(job.next_try_at.map(to_micros))
        .bind(job.worker_id.as_deref())
        .bind(job.lease_expires_at.map(to_micros))
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
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                attempts = excluded.attempts,
                max_retries = excluded.max_retries,
                updated_at = excluded.updated_at,
                next_try_at = excluded.next_try_at,
                worker_id = excluded.worker_id,
                processing_expires_at = excluded.processing_expires_at,
                exit_code = excluded.exit_code,
                stdout = excluded.stdout,
                stderr = excluded.stderr
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(to_micros(job.created_at))
        .bind(to_micros(Utc::now()))
        .bind(job.next_try_at.map(to_micros))
        .bind(job.worker_id.as_deref())
        .bind(job.lease_expires_at.map(to_micros))
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

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'processing',
                worker_id = ?,
                processing_expires_at = ?,
                next_try_at = NULL,
                updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                  AND (next_try_at IS NULL OR next_try_at <= ?)
                ORDER BY created_at, rowid
                LIMIT 1
            )
            AND state = 'pending'
            RETURNING id, command, state, attempts, max_retries, created_at, updated_at,
                      next_try_at, worker_id, processing_expires_at, exit_code, stdout, stderr
            "#,
        )
        .bind(worker_id)
        .bind(to_micros(expires_at))
        .bind(to_micros(now))
        .bind(to_micros(now))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
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
        .bind(to_micros(Utc::now()))
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
        .bind(i64::from(attempts))
        .bind(to_micros(next_try_at))
        .bind(outcome.exit_code)
        .bind(&outcome.stdout)
        .bind(&outcome.stderr)
        .bind(to_micros(Utc::now()))
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
        .bind(i64::from(attempts))
        .bind(outcome.exit_code)
        .bind(&outcome.stdout)
        .bind(&outcome.stderr)
        .bind(to_micros(Utc::now()))
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
        .bind(to_micros(lease_deadline(now, lease)?))
        .bind(to_micros(now))
        .bind(id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<u64> {
        let now = to_micros(now);
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
        let now = to_micros(Utc::now());
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
                    ORDER BY created_at DESC, rowid DESC
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
                    ORDER BY created_at DESC, rowid DESC
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
