//! Plain-text rendering of command results.

use queuectl_core::{Job, JobState, StateFilter};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Renders a job listing, one row per job.
pub fn jobs_table(jobs: &[Job], filter: StateFilter) -> String {
    if jobs.is_empty() {
        return format!("No jobs found for state={}\n", filter);
    }

    let mut out = format!(
        "{:<30} {:<12} {:<8} {:<11} {:<9} {}\n",
        "id", "state", "attempts", "max_retries", "exit_code", "command"
    );
    for job in jobs {
        let exit_code = job
            .exit_code
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        let _ = writeln!(
            out,
            "{:<30} {:<12} {:<8} {:<11} {:<9} {}",
            job.id, job.state, job.attempts, job.max_retries, exit_code, job.command
        );
    }
    out
}

/// Renders the dead letter queue listing.
pub fn dlq_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "DLQ is empty\n".to_string();
    }

    let mut out = format!(
        "{:<30} {:<8} {:<9} {:<27} {}\n",
        "id", "attempts", "exit_code", "updated_at", "command"
    );
    for job in jobs {
        let exit_code = job
            .exit_code
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        let _ = writeln!(
            out,
            "{:<30} {:<8} {:<9} {:<27} {}",
            job.id,
            job.attempts,
            exit_code,
            job.updated_at.to_rfc3339(),
            job.command
        );
    }
    out
}

/// Renders per-state counts in lifecycle order.
pub fn status_table(counts: &BTreeMap<JobState, u64>) -> String {
    let mut out = String::from("Job counts by state:\n");
    let _ = writeln!(out, "{:<12} {}", "state", "count");
    for state in JobState::all() {
        let _ = writeln!(out, "{:<12} {}", state, counts.get(&state).copied().unwrap_or(0));
    }
    let total: u64 = counts.values().sum();
    let _ = writeln!(out, "{:<12} {}", "total", total);
    out
}
