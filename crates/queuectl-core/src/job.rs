//! Job record, lifecycle states and execution outcomes.

use crate::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default attempt budget for a newly enqueued job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID of the form `job-<uuid>`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }

    /// Returns the job ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state.
///
/// `pending → processing → completed | pending (retry) | dead`, and
/// `dead → pending` through an explicit operator requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed (possibly not before `next_try_at`).
    #[default]
    Pending,
    /// Claimed by a worker holding a lease.
    Processing,
    /// Command exited with status 0.
    Completed,
    /// Retry budget exhausted; parked in the dead-letter queue.
    Dead,
}

impl JobState {
    /// Database / CLI representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }

    /// Checks if no worker will touch the job again.
    ///
    /// `Dead` is terminal for workers; only the DLQ requeue moves it.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// All states, in display order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Pending, Self::Processing, Self::Completed, Self::Dead]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(QueueError::validation(format!("Unknown job state: {other}"))),
        }
    }
}

/// State filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    /// Every job.
    #[default]
    All,
    /// Only jobs in the given state.
    Only(JobState),
}

impl StateFilter {
    /// Checks if a job in `state` passes the filter.
    #[must_use]
    pub fn matches(&self, state: JobState) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => *wanted == state,
        }
    }
}

impl FromStr for StateFilter {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(state) => state.fmt(f),
        }
    }
}

/// Captured result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecutionOutcome {
    /// Creates an outcome.
    #[must_use]
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Checks if the command exited with status 0.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,

    /// Shell command line run via `<shell> -c`.
    pub command: String,

    /// Lifecycle state.
    pub state: JobState,

    /// Executions charged so far, including abandoned ones.
    pub attempts: u32,

    /// Attempt budget; the job goes dead once `attempts` reaches it.
    pub max_retries: u32,

    /// Enqueue time; claims are served oldest first.
    pub created_at: DateTime<Utc>,

    /// Time of the last write.
    pub updated_at: DateTime<Utc>,

    /// Earliest time a retry may be claimed; set only while pending.
    pub next_try_at: Option<DateTime<Utc>>,

    /// Lease holder; set only while processing.
    pub worker_id: Option<String>,

    /// Lease deadline; set only while processing.
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Exit code of the latest attempt.
    pub exit_code: Option<i32>,

    /// Standard output of the latest attempt.
    pub stdout: Option<String>,

    /// Standard error of the latest attempt.
    pub stderr: Option<String>,
}

impl Job {
    /// Creates a new pending job with no attempts.
    #[must_use]
    pub fn new(id: JobId, command: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_try_at: None,
            worker_id: None,
            lease_expires_at: None,
            exit_code: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Checks if a worker may claim the job at `now`.
    #[must_use]
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_try_at.map_or(true, |at| at <= now)
    }

    /// Verifies the lifecycle invariants of a single row.
    pub fn check_invariants(&self) -> QueueResult<()> {
        if self.state == JobState::Dead && self.attempts < self.max_retries {
            return Err(QueueError::internal(format!(
                "job {} is dead with {} of {} attempts",
                self.id, self.attempts, self.max_retries
            )));
        }
        if self.next_try_at.is_some() && self.state != JobState::Pending {
            return Err(QueueError::internal(format!(
                "job {} has next_try_at while {}",
                self.id, self.state
            )));
        }
        let leased = self.worker_id.is_some() || self.lease_expires_at.is_some();
        if leased && self.state != JobState::Processing {
            return Err(QueueError::internal(format!(
                "job {} holds a lease while {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

/// Enqueue request as accepted from JSON.
///
/// Only `command` is required. Parsing is strict: unknown fields are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Explicit id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Shell command line; must not be blank.
    pub command: String,

    /// Attempt budget; the queue default applies when absent.
    #[serde(default, alias = "maxRetries")]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    /// Creates a spec for a command with defaults for everything else.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            max_retries: None,
        }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parses a spec from a JSON document.
    pub fn from_json(json: &str) -> QueueResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Err(QueueError::validation("No job JSON supplied"));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Validates the spec and builds a pending job.
    ///
    /// A blank or missing id is replaced by a generated one.
    pub fn into_job(self, default_max_retries: u32) -> QueueResult<Job> {
        if self.command.trim().is_empty() {
            return Err(QueueError::validation("Job command must not be empty"));
        }
        let max_retries = self.max_retries.unwrap_or(default_max_retries);
        if max_retries == 0 {
            return Err(QueueError::validation("max_retries must be at least 1"));
        }
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => JobId::from(id.trim()),
            _ => JobId::generate(),
        };
        Ok(Job::new(id, self.command, max_retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job-"));
    }

    #[test]
    fn test_state_round_trips_through_strings() {
        for state in JobState::all() {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert_eq!(" DEAD ".parse::<JobState>().unwrap(), JobState::Dead);
        assert!("failed".parse::<JobState>().is_err());
    }

    #[test]
    fn test_state_filter_parsing() {
        assert_eq!("all".parse::<StateFilter>().unwrap(), StateFilter::All);
        assert_eq!(
            "dead".parse::<StateFilter>().unwrap(),
            StateFilter::Only(JobState::Dead)
        );
        assert!(StateFilter::All.matches(JobState::Processing));
        assert!(!StateFilter::Only(JobState::Dead).matches(JobState::Pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn test_new_job_is_pending_and_eligible() {
        let job = Job::new(JobId::from("job-1"), "echo hi", 3);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.is_eligible_at(Utc::now()));
        assert!(job.check_invariants().is_ok());
    }

    #[test]
    fn test_future_next_try_is_not_eligible() {
        let mut job = Job::new(JobId::from("job-1"), "echo hi", 3);
        let now = Utc::now();
        job.next_try_at = Some(now + Duration::seconds(4));
        assert!(!job.is_eligible_at(now));
        assert!(job.is_eligible_at(now + Duration::seconds(4)));
    }

    #[test]
    fn test_invariants_reject_early_death() {
        let mut job = Job::new(JobId::from("job-1"), "exit 1", 3);
        job.state = JobState::Dead;
        job.attempts = 2;
        assert!(job.check_invariants().is_err());
        job.attempts = 3;
        assert!(job.check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_reject_next_try_outside_pending() {
        let mut job = Job::new(JobId::from("job-1"), "exit 0", 3);
        job.state = JobState::Completed;
        job.next_try_at = Some(Utc::now());
        assert!(job.check_invariants().is_err());
    }

    #[test]
    fn test_spec_parses_both_field_spellings() {
        let a = JobSpec::from_json(r#"{"command":"echo a","max_retries":5}"#).unwrap();
        let b = JobSpec::from_json(r#"{"command":"echo a","maxRetries":5}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.max_retries, Some(5));
    }

    #[test]
    fn test_spec_rejects_unknown_fields_and_garbage() {
        assert!(JobSpec::from_json(r#"{"command":"x","priority":1}"#).is_err());
        assert!(JobSpec::from_json("{command: x}").is_err());
        assert!(matches!(
            JobSpec::from_json("   "),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_spec_into_job_applies_defaults() {
        let job = JobSpec::new("sleep 1").into_job(DEFAULT_MAX_RETRIES).unwrap();
        assert!(job.id.as_str().starts_with("job-"));
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.state, JobState::Pending);

        let job = JobSpec::new("sleep 1").with_id("  ").into_job(3).unwrap();
        assert!(job.id.as_str().starts_with("job-"));

        let job = JobSpec::new("sleep 1").with_id("mine").into_job(3).unwrap();
        assert_eq!(job.id.as_str(), "mine");
    }

    #[test]
    fn test_spec_into_job_validates() {
        assert!(matches!(
            JobSpec::new("  ").into_job(3),
            Err(QueueError::Validation(_))
        ));
        assert!(matches!(
            JobSpec::new("true").with_max_retries(0).into_job(3),
            Err(QueueError::Validation(_))
        ));
    }
}
