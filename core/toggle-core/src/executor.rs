//! Issues the external state-changing command with bounded, linear retry.
//!
//! The executor only reports what happened. Whatever the caller decides to
//! display is the caller's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{CommandError, ExecutionError};
use crate::types::RetryPolicy;

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3_000;

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Short human-readable form for logs and error messages.
    pub fn label(&self) -> String {
        match self.args.first() {
            Some(first) if self.args.len() == 1 => format!("{} {}", self.program, first),
            Some(first) => format!("{} {} …", self.program, first),
            None => self.program.clone(),
        }
    }
}

/// Output of a successfully completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one attempt of a command. Implementations must not retry.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Spawns the command as a child process, bounded by its own timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(command.timeout(), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(CommandError::Spawn {
                    command: command.label(),
                    details: err.to_string(),
                })
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: command.label(),
                    timeout: command.timeout(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                command: command.label(),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

/// What a successful execution cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    pub attempts: u32,
}

/// Retrying wrapper around a [`CommandRunner`]. Holds no mutable state, so one
/// instance can serve every controller in the process.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Executor backed by real child processes.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessCommandRunner))
    }

    /// Runs `command` up to `policy.max_attempts` times, sleeping
    /// `policy.delay_before(k)` before attempt k. Stops at the first success.
    pub async fn execute(
        &self,
        command: &CommandSpec,
        policy: &RetryPolicy,
    ) -> Result<ExecutionReport, ExecutionError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    command = %command.label(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self.runner.run(command).await {
                Ok(_) => {
                    if attempt > 1 {
                        info!(command = %command.label(), attempt, "Command succeeded after retry");
                    }
                    return Ok(ExecutionReport { attempts: attempt });
                }
                Err(err) if attempt >= max_attempts => {
                    warn!(
                        command = %command.label(),
                        attempts = attempt,
                        error = %err,
                        "Command failed; retries exhausted"
                    );
                    return Err(ExecutionError {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    warn!(command = %command.label(), attempt, error = %err, "Command attempt failed");
                }
            }

            attempt += 1;
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use tokio::time::Instant;

    fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            backoff_multiplier: 1.0,
        }
    }

    fn toggle_command() -> CommandSpec {
        CommandSpec::new("osascript", &["-e", "toggle"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_linear_delays() {
        let runner = Arc::new(ScriptedRunner::failing_times(2));
        let executor = Executor::new(runner.clone());

        let report = executor
            .execute(&toggle_command(), &policy(3, 200))
            .await
            .expect("third attempt succeeds");

        assert_eq!(report.attempts, 3);
        let calls = runner.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(200));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_carries_last_failure() {
        let runner = Arc::new(ScriptedRunner::failing_times(10));
        let executor = Executor::new(runner.clone());

        let err = executor
            .execute(&toggle_command(), &policy(3, 200))
            .await
            .expect_err("all attempts fail");

        assert_eq!(err.attempts, 3);
        assert_eq!(runner.call_count(), 3);
        assert!(matches!(err.last, CommandError::NonZeroExit { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_after_success() {
        let runner = Arc::new(ScriptedRunner::failing_times(0));
        let executor = Executor::new(runner.clone());
        let started = Instant::now();

        let report = executor
            .execute(&toggle_command(), &policy(5, 200))
            .await
            .expect("first attempt succeeds");

        assert_eq!(report.attempts, 1);
        assert_eq!(runner.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_tries_once() {
        let runner = Arc::new(ScriptedRunner::failing_times(10));
        let executor = Executor::new(runner.clone());

        let err = executor
            .execute(&toggle_command(), &policy(0, 200))
            .await
            .expect_err("fails");
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_process_runner_reports_missing_program() {
        let command = CommandSpec::new("/definitely/not/a/real/binary", &[]);
        let err = ProcessCommandRunner
            .run(&command)
            .await
            .expect_err("spawn fails");
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn test_label_abbreviates_long_argument_lists() {
        assert_eq!(CommandSpec::new("true", &[]).label(), "true");
        assert_eq!(CommandSpec::new("echo", &["hi"]).label(), "echo hi");
        assert_eq!(
            CommandSpec::new("osascript", &["-e", "script"]).label(),
            "osascript -e …"
        );
    }

    #[test]
    fn test_command_spec_defaults_timeout_from_toml() {
        let spec: CommandSpec = toml::from_str(r#"program = "true""#).unwrap();
        assert_eq!(spec.timeout(), Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS));
        assert!(spec.args.is_empty());
    }
}
