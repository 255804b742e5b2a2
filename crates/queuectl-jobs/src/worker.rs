//! Workers and the worker pool.
//!
//! A worker repeats claim, execute, resolve against the shared store. It
//! keeps its lease alive while the command runs and every resolve write is
//! conditioned on still holding that lease, so a worker whose lease was
//! reclaimed cannot overwrite the job's newer state.

use crate::config::{WorkerOptions, WorkerPoolConfig};
use crate::executor::CommandExecutor;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::retry::retry_at;
use crate::sweeper::LeaseSweeper;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use queuectl_core::{ExecutionOutcome, Job, QueueError, QueueResult};
use queuectl_repository::JobStore;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// How a claimed job was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exit code 0; the job is completed.
    Completed,

    /// Failed with budget left; pending again from `next_try_at`.
    Retry {
        attempts: u32,
        next_try_at: DateTime<Utc>,
        delay: Duration,
    },

    /// Failed with the budget exhausted; moved to the DLQ.
    Dead { attempts: u32 },

    /// The lease was reclaimed before the result could be written.
    LeaseLost,
}

/// Result of one worker iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was eligible.
    Idle,
    /// A job was claimed, executed and resolved.
    Processed(Resolution),
}

/// Counters shared by the workers of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    claimed: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    dead: AtomicU64,
    lease_lost: AtomicU64,
    errors: AtomicU64,
}

impl WorkerStats {
    fn record(&self, resolution: &Resolution) {
        self.claimed.fetch_add(1, Ordering::Relaxed);
        let counter = match resolution {
            Resolution::Completed => &self.completed,
            Resolution::Retry { .. } => &self.retried,
            Resolution::Dead { .. } => &self.dead,
            Resolution::LeaseLost => &self.lease_lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A single worker.
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    options: WorkerOptions,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Creates a worker with a fresh identity.
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            id: format!("worker-{}", Uuid::new_v4()),
            store,
            executor,
            options,
            stats: Arc::default(),
        }
    }

    fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the worker identity written into claimed rows.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims one eligible job and processes it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the claim or the resolve write fails. A
    /// failed resolve leaves the job processing until its lease expires.
    pub async fn run_once(&self) -> QueueResult<Tick> {
        let Some(job) = self.store.claim_next(&self.id, self.options.lease).await? else {
            return Ok(Tick::Idle);
        };
        JobMetrics::job_claimed(&self.id);

        let resolution = self.process(&job).await?;
        self.stats.record(&resolution);
        Ok(Tick::Processed(resolution))
    }

    /// Runs until `shutdown` turns true.
    ///
    /// A job already being executed is finished before the loop exits.
    /// Storage errors are logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.id, "Worker started");

        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(Tick::Processed(_)) => continue,
                Ok(Tick::Idle) => self.options.poll_interval,
                Err(e) => {
                    self.stats.record_error();
                    error!(worker_id = %self.id, error = %e, "Worker iteration failed");
                    self.options.poll_interval
                }
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, job: &Job) -> QueueResult<Resolution> {
        info!(
            job_id = %job.id,
            worker_id = %self.id,
            attempt = job.attempts + 1,
            max_retries = job.max_retries,
            command = %job.command,
            "Processing job"
        );

        let started = Instant::now();
        let outcome = self.execute_with_heartbeat(job).await;
        let elapsed = started.elapsed();

        let resolution = if outcome.is_success() {
            self.complete(job, &outcome, elapsed).await?
        } else {
            self.fail(job, &outcome, elapsed).await?
        };

        if resolution == Resolution::LeaseLost {
            warn!(
                job_id = %job.id,
                worker_id = %self.id,
                exit_code = outcome.exit_code,
                "Lease lost before resolve; result discarded"
            );
            JobMetrics::lease_lost();
        }
        Ok(resolution)
    }

    async fn complete(
        &self,
        job: &Job,
        outcome: &ExecutionOutcome,
        elapsed: Duration,
    ) -> QueueResult<Resolution> {
        if !self.store.mark_completed(&job.id, &self.id, outcome).await? {
            return Ok(Resolution::LeaseLost);
        }
        info!(
            job_id = %job.id,
            duration_ms = elapsed.as_millis() as u64,
            "Job completed"
        );
        JobMetrics::job_completed(elapsed);
        Ok(Resolution::Completed)
    }

    async fn fail(
        &self,
        job: &Job,
        outcome: &ExecutionOutcome,
        elapsed: Duration,
    ) -> QueueResult<Resolution> {
        let attempts = job.attempts.saturating_add(1);
        let retry = self.options.retry;

        if retry.should_retry(attempts, job.max_retries) {
            let delay = retry.delay_for_attempt(attempts);
            let next_try_at = retry_at(Utc::now(), delay);
            if !self
                .store
                .mark_retry(&job.id, &self.id, attempts, next_try_at, outcome)
                .await?
            {
                return Ok(Resolution::LeaseLost);
            }
            warn!(
                job_id = %job.id,
                exit_code = outcome.exit_code,
                attempts,
                max_retries = job.max_retries,
                delay_secs = delay.as_secs(),
                "Job failed, retry scheduled"
            );
            JobMetrics::job_retried(attempts, elapsed);
            return Ok(Resolution::Retry {
                attempts,
                next_try_at,
                delay,
            });
        }

        if !self.store.mark_dead(&job.id, &self.id, attempts, outcome).await? {
            return Ok(Resolution::LeaseLost);
        }
        error!(
            job_id = %job.id,
            exit_code = outcome.exit_code,
            attempts,
            "Job exhausted its retries, moved to dead letter queue"
        );
        JobMetrics::job_dead_lettered("exhausted");
        Ok(Resolution::Dead { attempts })
    }

    /// Executes the job's command, renewing the lease until it finishes.
    ///
    /// A command that cannot be started becomes a failed outcome with exit
    /// code -1 so it goes through the normal retry path.
    async fn execute_with_heartbeat(&self, job: &Job) -> ExecutionOutcome {
        let execution = self.executor.execute(&job.command);
        tokio::pin!(execution);

        let period = self.options.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval(period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; the claim already set the lease.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut execution => {
                    return result.unwrap_or_else(|e| {
                        warn!(job_id = %job.id, error = %e, "Command could not be executed");
                        ExecutionOutcome::new(-1, "", e.to_string())
                    });
                }
                _ = heartbeat.tick() => {
                    match self.store.renew_lease(&job.id, &self.id, self.options.lease).await {
                        Ok(true) => debug!(job_id = %job.id, "Lease renewed"),
                        Ok(false) => warn!(job_id = %job.id, worker_id = %self.id, "Lease no longer held"),
                        Err(e) => warn!(job_id = %job.id, error = %e, "Failed to renew lease"),
                    }
                }
            }
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured worker count.
    pub workers: usize,

    /// Jobs claimed and resolved.
    pub jobs_processed: u64,

    /// Jobs completed.
    pub jobs_completed: u64,

    /// Failed attempts scheduled for retry.
    pub jobs_retried: u64,

    /// Jobs moved to the DLQ.
    pub jobs_dead: u64,

    /// Results discarded after losing the lease.
    pub leases_lost: u64,

    /// Iterations that failed with a storage error.
    pub errors: u64,
}

/// A set of workers sharing one store, plus the lease sweeper.
pub struct WorkerPool {
    /// Unique pool ID.
    id: String,

    store: Arc<dyn JobStore>,

    executor: Arc<dyn CommandExecutor>,

    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Stop flag observed by every task.
    shutdown_tx: watch::Sender<bool>,

    /// Spawned worker and sweeper tasks.
    handles: Mutex<Vec<JoinHandle<()>>>,

    /// Running flag.
    running: Arc<AtomicBool>,

    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            store,
            executor,
            config,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::default(),
        }
    }

    /// Spawns the workers and the lease sweeper.
    ///
    /// # Errors
    ///
    /// Fails if the worker count is zero or the pool is already running.
    pub fn start(&self) -> QueueResult<()> {
        if self.config.count == 0 {
            return Err(QueueError::validation("Worker count must be at least 1"));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::internal("Worker pool already running"));
        }

        info!(
            pool_id = %self.id,
            workers = self.config.count,
            lease_secs = self.config.worker.lease.as_secs(),
            "Starting worker pool"
        );

        self.shutdown_tx.send_replace(false);
        let mut handles = self.handles.lock();

        for _ in 0..self.config.count {
            let worker = Worker::new(
                self.store.clone(),
                self.executor.clone(),
                self.config.worker.clone(),
            )
            .with_stats(self.stats.clone());
            let span = tracing::info_span!("worker", worker_id = %worker.id());
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(
                async move { worker.run(shutdown_rx).await }.instrument(span),
            ));
        }

        let sweeper = LeaseSweeper::new(self.store.clone(), self.config.sweep_interval);
        let shutdown_rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(
            async move { sweeper.run(shutdown_rx).await }.instrument(tracing::info_span!("sweeper")),
        ));

        WorkerMetrics::update_workers(&self.id, self.config.count as u64);
        Ok(())
    }

    /// Signals every task to stop after its current job.
    pub fn shutdown(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        self.shutdown_tx.send_replace(true);
    }

    /// Waits for every spawned task to exit.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(pool_id = %self.id, error = %e, "Worker task panicked");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        WorkerMetrics::update_workers(&self.id, 0);

        let stats = self.stats();
        info!(
            pool_id = %self.id,
            processed = stats.jobs_processed,
            completed = stats.jobs_completed,
            retried = stats.jobs_retried,
            dead = stats.jobs_dead,
            "Worker pool stopped"
        );
    }

    /// Starts the pool, runs until `signal` resolves, then shuts down
    /// gracefully.
    ///
    /// # Errors
    ///
    /// Returns the error from [`WorkerPool::start`].
    pub async fn run_until<F>(&self, signal: F) -> QueueResult<WorkerPoolStats>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        signal.await;
        self.shutdown();
        self.wait().await;
        Ok(self.stats())
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            workers: self.config.count,
            jobs_processed: self.stats.claimed.load(Ordering::Relaxed),
            jobs_completed: self.stats.completed.load(Ordering::Relaxed),
            jobs_retried: self.stats.retried.load(Ordering::Relaxed),
            jobs_dead: self.stats.dead.load(Ordering::Relaxed),
            leases_lost: self.stats.lease_lost.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_resolutions() {
        let stats = WorkerStats::default();
        stats.record(&Resolution::Completed);
        stats.record(&Resolution::Dead { attempts: 3 });
        stats.record(&Resolution::LeaseLost);
        stats.record_error();

        assert_eq!(stats.claimed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.completed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.dead.load(Ordering::Relaxed), 1);
        assert_eq!(stats.lease_lost.load(Ordering::Relaxed), 1);
        assert_eq!(stats.retried.load(Ordering::Relaxed), 0);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
    }
}
