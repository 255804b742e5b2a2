//! Command handlers.
//!
//! Each handler writes its human-readable result to `out` and returns an
//! error for anything that should end the process with a non-zero status.

use crate::cli::{Command, DlqCommand};
use crate::output;
use crate::startup::print_startup_info;
use queuectl_config::AppConfig;
use queuectl_core::{JobId, QueueError, QueueResult, StateFilter};
use queuectl_jobs::{ExecutorOptions, JobQueue, ShellExecutor, WorkerPool, WorkerPoolConfig};
use queuectl_repository::DatabasePool;
use std::future::Future;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Loaded configuration plus an open database pool.
pub struct Context {
    config: AppConfig,
    pool: DatabasePool,
}

impl Context {
    /// Opens the configured database, running migrations if enabled.
    pub async fn connect(config: AppConfig) -> QueueResult<Self> {
        let pool = DatabasePool::new(&config.database).await?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns a queue facade over the shared store.
    pub fn queue(&self) -> JobQueue {
        JobQueue::new(self.pool.job_store(), self.config.retry.max_retries)
    }

    /// Closes the database pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Runs one parsed command.
///
/// `shutdown` is only awaited by the worker command.
pub async fn dispatch<W, S>(command: Command, ctx: &Context, out: &mut W, shutdown: S) -> QueueResult<()>
where
    W: Write,
    S: Future<Output = ()>,
{
    match command {
        Command::Enqueue { json } => enqueue(ctx, &json, out).await,
        Command::Worker { count } => worker(ctx, count, out, shutdown).await,
        Command::List { state } => list(ctx, state, out).await,
        Command::Dlq {
            command: DlqCommand::List,
        } => dlq_list(ctx, out).await,
        Command::Dlq {
            command: DlqCommand::Retry { id },
        } => dlq_retry(ctx, &id, out).await,
        Command::Status => status(ctx, out).await,
    }
}

/// Enqueues one job from JSON given as arguments, `@file` or stdin.
pub async fn enqueue<W: Write>(ctx: &Context, parts: &[String], out: &mut W) -> QueueResult<()> {
    let json = read_job_json(parts).await?;
    let job = ctx.queue().enqueue_json(&json).await?;
    writeln!(out, "Enqueued job: {}", job.id)?;
    Ok(())
}

/// Runs a worker pool until `shutdown` resolves.
pub async fn worker<W, S>(ctx: &Context, count: Option<usize>, out: &mut W, shutdown: S) -> QueueResult<()>
where
    W: Write,
    S: Future<Output = ()>,
{
    let config = WorkerPoolConfig::from(ctx.config());
    let config = match count {
        Some(count) => config.with_count(count),
        None => config,
    };
    if config.count == 0 {
        return Err(QueueError::validation("--count must be at least 1"));
    }

    let executor = ShellExecutor::from(ExecutorOptions::from(&ctx.config().worker));
    print_startup_info(ctx.config(), ctx.pool.backend(), config.count);
    writeln!(out, "Starting {} worker(s)", config.count)?;
    out.flush()?;

    let pool = WorkerPool::new(ctx.pool.job_store(), Arc::new(executor), config);
    let stats = pool.run_until(shutdown).await?;

    info!(pool_id = %stats.id, "Workers stopped");
    writeln!(
        out,
        "Workers stopped: {} processed ({} completed, {} retried, {} dead)",
        stats.jobs_processed, stats.jobs_completed, stats.jobs_retried, stats.jobs_dead
    )?;
    Ok(())
}

/// Lists jobs matching `state`.
pub async fn list<W: Write>(ctx: &Context, state: StateFilter, out: &mut W) -> QueueResult<()> {
    let jobs = ctx.queue().list(state).await?;
    write!(out, "{}", output::jobs_table(&jobs, state))?;
    Ok(())
}

/// Lists dead jobs.
pub async fn dlq_list<W: Write>(ctx: &Context, out: &mut W) -> QueueResult<()> {
    let jobs = ctx.queue().dlq().list().await?;
    write!(out, "{}", output::dlq_table(&jobs))?;
    Ok(())
}

/// Requeues a dead job.
pub async fn dlq_retry<W: Write>(ctx: &Context, id: &str, out: &mut W) -> QueueResult<()> {
    let job = ctx.queue().dlq().requeue(&JobId::from(id)).await?;
    writeln!(out, "Retried job: {} (moved to pending)", job.id)?;
    Ok(())
}

/// Prints job counts per state.
pub async fn status<W: Write>(ctx: &Context, out: &mut W) -> QueueResult<()> {
    let counts = ctx.queue().status().await?;
    write!(out, "{}", output::status_table(&counts))?;
    Ok(())
}

async fn read_job_json(parts: &[String]) -> QueueResult<String> {
    if let [single] = parts {
        if let Some(path) = single.strip_prefix('@') {
            return tokio::fs::read_to_string(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    QueueError::validation(format!("File not found: {}", path))
                } else {
                    QueueError::Io(e)
                }
            });
        }
    }

    if !parts.is_empty() {
        return Ok(parts.join(" "));
    }

    if std::io::stdin().is_terminal() {
        return Err(QueueError::validation(
            "No job JSON supplied (argument, @file, or stdin)",
        ));
    }

    let mut json = String::new();
    tokio::io::stdin().read_to_string(&mut json).await?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::JobState;
    use tempfile::TempDir;

    async fn context(dir: &TempDir) -> Context {
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        Context::connect(config).await.unwrap()
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_read_job_json_joins_parts() {
        let parts = vec!["{\"command\":".to_string(), "\"echo hi\"}".to_string()];
        assert_eq!(read_job_json(&parts).await.unwrap(), "{\"command\": \"echo hi\"}");
    }

    #[tokio::test]
    async fn test_read_job_json_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, r#"{"command": "true"}"#).unwrap();

        let parts = vec![format!("@{}", path.display())];
        assert_eq!(read_job_json(&parts).await.unwrap(), r#"{"command": "true"}"#);

        let missing = vec!["@/nonexistent/job.json".to_string()];
        let err = read_job_json(&missing).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_list_status() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let mut out = Vec::new();
        enqueue(&ctx, &[r#"{"id":"job-1","command":"echo hi"}"#.to_string()], &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "Enqueued job: job-1\n");

        let err = enqueue(&ctx, &[r#"{"id":"job-1","command":"true"}"#.to_string()], &mut Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut out = Vec::new();
        list(&ctx, StateFilter::Only(JobState::Pending), &mut out).await.unwrap();
        let listing = text(out);
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("job-1"));

        let mut out = Vec::new();
        status(&ctx, &mut out).await.unwrap();
        assert!(text(out).contains("pending      1\n"));

        ctx.close().await;
    }

    #[tokio::test]
    async fn test_dlq_retry_of_pending_job_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        enqueue(&ctx, &[r#"{"id":"job-1","command":"true"}"#.to_string()], &mut Vec::new())
            .await
            .unwrap();

        let err = dlq_retry(&ctx, "job-1", &mut Vec::new()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = dlq_retry(&ctx, "missing", &mut Vec::new()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut out = Vec::new();
        dlq_list(&ctx, &mut out).await.unwrap();
        assert_eq!(text(out), "DLQ is empty\n");
    }

    #[tokio::test]
    async fn test_worker_processes_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        enqueue(&ctx, &[r#"{"id":"job-1","command":"exit 0"}"#.to_string()], &mut Vec::new())
            .await
            .unwrap();

        let queue = ctx.queue();
        let drained = async move {
            loop {
                let job = queue.get(&JobId::from("job-1")).await.unwrap();
                if job.state == JobState::Completed {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        };

        let mut out = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(20),
            worker(&ctx, Some(2), &mut out, drained),
        )
        .await
        .unwrap()
        .unwrap();

        let printed = text(out);
        assert!(printed.starts_with("Starting 2 worker(s)\n"));
        assert!(printed.contains("1 processed (1 completed, 0 retried, 0 dead)"));
    }

    #[tokio::test]
    async fn test_worker_rejects_zero_count() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let err = worker(&ctx, Some(0), &mut Vec::new(), async {})
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
