//! QueueCtl Jobs - Worker Runtime
//!
//! Everything that moves a job through its lifecycle:
//! - Shell command execution with separate stdout and stderr capture
//! - Workers that claim, execute and resolve jobs under a renewable lease
//! - Exponential retry backoff and a dead letter queue
//! - A worker pool with graceful shutdown
//! - A sweeper that reclaims jobs whose worker died mid-execution
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    QueueCtl Worker Runtime                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  JobQueue::enqueue ──► ┌──────────────────────────────┐       │
//! │                        │     JobStore (SQLite/MySQL)   │       │
//! │  DlqController ──────► │  pending → processing → ...   │       │
//! │                        └──────────────┬───────────────┘       │
//! │                                       │ claim_next             │
//! │  ┌────────────────────────────────────┼────────────────────┐  │
//! │  │                WorkerPool          ▼                    │  │
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐  ┌──────────┐  │  │
//! │  │  │ Worker 1 │ │ Worker 2 │ │ Worker N │  │ Sweeper  │  │  │
//! │  │  └────┬─────┘ └────┬─────┘ └────┬─────┘  └──────────┘  │  │
//! │  │       └────────────┴────────────┘                       │  │
//! │  │                    │ CommandExecutor (sh -c)            │  │
//! │  │         ┌──────────┼──────────────┐                     │  │
//! │  │         ▼          ▼              ▼                     │  │
//! │  │    completed   pending (retry)   dead                   │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │                                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use queuectl_jobs::prelude::*;
//!
//! let queue = JobQueue::new(store.clone(), 3);
//! queue.enqueue(JobSpec::new("echo hello")).await?;
//!
//! let pool = WorkerPool::new(store, Arc::new(ShellExecutor::default()), config);
//! pool.run_until(shutdown_signal()).await?;
//! ```

pub mod config;
pub mod dlq;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod sweeper;
pub mod worker;

pub use config::{ExecutorOptions, WorkerOptions, WorkerPoolConfig};
pub use dlq::DlqController;
pub use executor::{CommandExecutor, ShellExecutor, TIMEOUT_EXIT_CODE};
pub use metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::JobQueue;
pub use retry::{retry_at, RetryPolicy};
pub use sweeper::LeaseSweeper;
pub use worker::{Resolution, Tick, Worker, WorkerPool, WorkerPoolStats, WorkerStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dlq::DlqController;
    pub use crate::executor::{CommandExecutor, ShellExecutor};
    pub use crate::queue::JobQueue;
    pub use crate::retry::RetryPolicy;
    pub use crate::worker::{Worker, WorkerPool};
    pub use crate::WorkerPoolConfig;
    pub use queuectl_core::{Job, JobId, JobSpec, JobState, QueueError, QueueResult, StateFilter};
}
