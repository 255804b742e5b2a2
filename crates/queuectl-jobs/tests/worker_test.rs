//! Worker claim-execute-resolve tests against a real SQLite store.

mod common;

use chrono::Utc;
use common::{fast_options, TestDatabase, UnavailableStore};
use queuectl_core::{JobId, JobSpec, JobState};
use queuectl_jobs::{JobQueue, Resolution, ShellExecutor, Tick, Worker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn shell() -> Arc<ShellExecutor> {
    Arc::new(ShellExecutor::default())
}

#[tokio::test]
async fn test_idle_when_queue_is_empty() {
    let db = TestDatabase::new().await;
    let worker = Worker::new(db.store(), shell(), fast_options());

    assert_eq!(worker.run_once().await.unwrap(), Tick::Idle);
}

#[tokio::test]
async fn test_successful_command_completes_job() {
    let db = TestDatabase::new().await;
    let queue = JobQueue::new(db.store(), 3);
    let job = queue
        .enqueue(JobSpec::new("echo done").with_id("job-a"))
        .await
        .unwrap();

    let worker = Worker::new(db.store(), shell(), fast_options());
    assert_eq!(
        worker.run_once().await.unwrap(),
        Tick::Processed(Resolution::Completed)
    );

    let found = queue.get(&job.id).await.unwrap();
    assert_eq!(found.state, JobState::Completed);
    assert_eq!(found.exit_code, Some(0));
    assert_eq!(found.stdout.as_deref(), Some("done\n"));
    assert_eq!(found.attempts, 0);
    assert!(found.worker_id.is_none());
    assert!(found.lease_expires_at.is_none());
    found.check_invariants().unwrap();
}

#[tokio::test]
async fn test_failing_command_retries_then_dies() {
    let db = TestDatabase::new().await;
    let queue = JobQueue::new(db.store(), 3);
    let id = JobId::from("job-b");
    queue
        .enqueue(JobSpec::new("echo boom 1>&2; exit 1").with_id("job-b").with_max_retries(2))
        .await
        .unwrap();

    let worker = Worker::new(db.store(), shell(), fast_options());

    let before = Utc::now();
    let tick = worker.run_once().await.unwrap();
    let after = Utc::now();
    let Tick::Processed(Resolution::Retry {
        attempts,
        next_try_at,
        delay,
    }) = tick
    else {
        panic!("expected retry, got {tick:?}");
    };
    assert_eq!(attempts, 1);
    assert_eq!(delay, Duration::from_secs(2));
    assert!(next_try_at >= before + chrono::Duration::seconds(2));
    assert!(next_try_at <= after + chrono::Duration::seconds(2));

    let found = queue.get(&id).await.unwrap();
    assert_eq!(found.state, JobState::Pending);
    assert_eq!(found.attempts, 1);
    assert_eq!(found.exit_code, Some(1));
    assert_eq!(found.stderr.as_deref(), Some("boom\n"));
    assert!(found.next_try_at.is_some());
    found.check_invariants().unwrap();

    // Not eligible until the backoff elapses.
    assert_eq!(worker.run_once().await.unwrap(), Tick::Idle);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(
        worker.run_once().await.unwrap(),
        Tick::Processed(Resolution::Dead { attempts: 2 })
    );

    let found = queue.get(&id).await.unwrap();
    assert_eq!(found.state, JobState::Dead);
    assert_eq!(found.attempts, 2);
    assert!(found.next_try_at.is_none());
    found.check_invariants().unwrap();
}

#[tokio::test]
async fn test_unrunnable_shell_goes_through_retry_path() {
    let db = TestDatabase::new().await;
    let queue = JobQueue::new(db.store(), 1);
    let job = queue.enqueue(JobSpec::new("true")).await.unwrap();

    let worker = Worker::new(
        db.store(),
        Arc::new(ShellExecutor::new("/nonexistent/shell")),
        fast_options(),
    );
    assert_eq!(
        worker.run_once().await.unwrap(),
        Tick::Processed(Resolution::Dead { attempts: 1 })
    );

    let found = queue.get(&job.id).await.unwrap();
    assert_eq!(found.exit_code, Some(-1));
    assert!(found.stderr.unwrap_or_default().contains("/nonexistent/shell"));
}

#[tokio::test]
async fn test_reclaimed_lease_discards_result() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let queue = JobQueue::new(store.clone(), 3);
    let job = queue.enqueue(JobSpec::new("sleep 1")).await.unwrap();

    let mut options = fast_options();
    options.lease = Duration::ZERO;
    let worker = Worker::new(store.clone(), shell(), options);

    let running = tokio::spawn(async move { worker.run_once().await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.reclaim_expired(Utc::now()).await.unwrap(), 1);

    let tick = running.await.unwrap().unwrap();
    assert_eq!(tick, Tick::Processed(Resolution::LeaseLost));

    let found = queue.get(&job.id).await.unwrap();
    assert_eq!(found.state, JobState::Pending);
    assert_eq!(found.attempts, 1);
    assert!(found.exit_code.is_none());
}

#[tokio::test]
async fn test_heartbeat_keeps_lease_alive() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let queue = JobQueue::new(store.clone(), 3);
    let job = queue.enqueue(JobSpec::new("sleep 1.5")).await.unwrap();

    let mut options = fast_options();
    options.lease = Duration::from_secs(1);
    options.heartbeat_interval = Duration::from_millis(100);
    let worker = Worker::new(store.clone(), shell(), options);

    let running = tokio::spawn(async move { worker.run_once().await });
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.reclaim_expired(Utc::now()).await.unwrap(), 0);

    let tick = running.await.unwrap().unwrap();
    assert_eq!(tick, Tick::Processed(Resolution::Completed));
    assert_eq!(queue.get(&job.id).await.unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn test_storage_errors_do_not_stop_the_worker() {
    let store = Arc::new(UnavailableStore::default());
    let worker = Worker::new(store.clone(), shell(), fast_options());

    let err = worker.run_once().await.unwrap_err();
    assert_eq!(err.exit_code(), 1);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert!(store.claims() >= 3);
}

#[tokio::test]
async fn test_worker_ids_are_unique() {
    let db = TestDatabase::new().await;
    let a = Worker::new(db.store(), shell(), fast_options());
    let b = Worker::new(db.store(), shell(), fast_options());

    assert!(a.id().starts_with("worker-"));
    assert_ne!(a.id(), b.id());
}
