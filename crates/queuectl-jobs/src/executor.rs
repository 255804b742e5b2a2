//! Shell command execution.

use crate::config::ExecutorOptions;
use async_trait::async_trait;
use queuectl_core::{ExecutionOutcome, QueueError, QueueResult};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported when a command is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Runs a job's command and reports how it ended.
///
/// A non-zero exit code is a normal outcome, not an error. `Err` means the
/// command could not be run at all.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `command` to completion.
    async fn execute(&self, command: &str) -> QueueResult<ExecutionOutcome>;
}

/// Executes commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Option<Duration>,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl From<ExecutorOptions> for ShellExecutor {
    fn from(options: ExecutorOptions) -> Self {
        Self::new(options.shell).with_timeout(options.timeout)
    }
}

impl ShellExecutor {
    /// Creates an executor using the given shell and no timeout.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            timeout: None,
        }
    }

    /// Sets the command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the shell program.
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> QueueResult<ExecutionOutcome> {
        debug!(shell = %self.shell, command, "Executing command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The shell leads its own process group so a timeout can take down
        // every process the command started.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| QueueError::Execution(format!("Failed to spawn {}: {}", self.shell, e)))?;
        #[cfg(unix)]
        let pid = child.id();

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| QueueError::Execution("stdout was not captured".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| QueueError::Execution("stderr was not captured".to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // Both pipes are drained while waiting so a chatty command never
        // blocks on a full pipe buffer.
        let run = async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr),
            );
            out.and(err).and(status)
        };

        let status = match self.timeout {
            None => Some(run.await),
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
        };

        let outcome = match status {
            Some(status) => {
                let status =
                    status.map_err(|e| QueueError::Execution(format!("Failed to wait for command: {}", e)))?;
                ExecutionOutcome::new(
                    exit_code(status),
                    String::from_utf8_lossy(&stdout),
                    String::from_utf8_lossy(&stderr),
                )
            }
            None => {
                #[cfg(unix)]
                {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                }
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out command");
                }
                let limit = self.timeout.unwrap_or_default();
                let mut stderr = String::from_utf8_lossy(&stderr).into_owned();
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("queuectl: command timed out after {:?}", limit));
                ExecutionOutcome::new(TIMEOUT_EXIT_CODE, String::from_utf8_lossy(&stdout), stderr)
            }
        };

        debug!(exit_code = outcome.exit_code, "Command finished");
        Ok(outcome)
    }
}

/// Sends SIGKILL to the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        warn!(pid, error = %e, "Failed to kill process group");
    }
}

/// Exit code of a finished process; `128 + signal` when killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
