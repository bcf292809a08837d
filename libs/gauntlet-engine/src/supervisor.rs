/// Process Supervisor - Two-Layer Timeout Owner
///
/// **Core Responsibility:**
/// Run exactly one attempt in a separate, memory-isolated interpreter
/// process and always come back with exactly one result.
///
/// The inner layer is the harness's own deadline; the supervisor owns the
/// outer layer: it waits `timeout_seconds + grace_period` for the child to
/// report, then force-kills and reaps it. A child killed before writing a
/// result is recorded as timed out with the supervisor-observed elapsed
/// time; a child that exits on its own without reporting is fatal. No exit
/// path leaks the child: normal completion and forced kills both reap, and
/// `kill_on_drop` covers cancellation of the attempt future itself.
use std::process::Stdio;
use std::time::{Duration, Instant};

use gauntlet_common::{EvaluationTask, ExecutionResult, ExecutionStatus};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::{guard, harness};

#[derive(Debug, Error)]
enum AttemptError {
    #[error("scratch directory setup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("timeout_seconds is not representable as a duration")]
    BadTimeout,
}

pub struct ProcessSupervisor {
    config: EngineConfig,
}

impl ProcessSupervisor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one attempt to completion. Infallible by contract: supervisor-side
    /// errors fold into a terminal `Fatal` result rather than propagating.
    pub async fn run_attempt(&self, task: &EvaluationTask) -> ExecutionResult {
        let started = Instant::now();
        match self.supervise(task, started).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    task_id = %task.task_id,
                    attempt_index = task.attempt_index,
                    error = %err,
                    "attempt failed before the isolation process could report"
                );
                ExecutionResult {
                    status: ExecutionStatus::Fatal(format!("supervisor: {err}")),
                    runtime_seconds: started.elapsed().as_secs_f64(),
                }
            }
        }
    }

    async fn supervise(
        &self,
        task: &EvaluationTask,
        started: Instant,
    ) -> Result<ExecutionResult, AttemptError> {
        let timeout = Duration::try_from_secs_f64(task.timeout_seconds)
            .map_err(|_| AttemptError::BadTimeout)?;
        let budget = timeout + self.config.grace_period;

        // Exclusive scratch directory; removed by the parent after reap.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("gauntlet-{}-", Uuid::new_v4()))
            .tempdir()?;
        let harness_path = scratch.path().join(harness::HARNESS_FILE);
        tokio::fs::write(&harness_path, harness::render(task)?).await?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg("-I")
            .arg("-E")
            .arg("-S")
            .arg("-u")
            .arg(&harness_path)
            .current_dir(scratch.path())
            .env_clear()
            .env(
                "PATH",
                std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
            )
            .env("OMP_NUM_THREADS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        guard::apply_resource_limits(&mut cmd, self.config.max_memory_bytes);

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AttemptError::Io(std::io::Error::other("child stdout was not captured"))
        })?;
        let output_cap = self.config.max_output_bytes;
        let reader = tokio::spawn(read_capped(stdout, output_cap));

        let mut killed = false;
        match tokio::time::timeout(budget, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(
                    task_id = %task.task_id,
                    attempt_index = task.attempt_index,
                    exit = %status,
                    "isolation process exited"
                );
            }
            Err(_) => {
                killed = true;
                warn!(
                    task_id = %task.task_id,
                    attempt_index = task.attempt_index,
                    budget_seconds = budget.as_secs_f64(),
                    "isolation process unresponsive past the grace period, killing"
                );
                // start_kill errors only if the child already exited; either
                // way the wait below reaps it.
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        let output = reader.await.unwrap_or_default();
        let elapsed = started.elapsed().as_secs_f64();

        Ok(match parse_result(&output) {
            Some(result) => result,
            None if killed => ExecutionResult {
                status: ExecutionStatus::TimedOut,
                runtime_seconds: elapsed,
            },
            None => ExecutionResult {
                status: ExecutionStatus::Fatal(
                    "isolation process exited without reporting a result".to_string(),
                ),
                runtime_seconds: elapsed,
            },
        })
    }
}

/// Capture child stdout up to `cap` bytes, then drain the rest so the child
/// never blocks on a full pipe.
async fn read_capped(mut stdout: ChildStdout, cap: u64) -> String {
    let mut buf = Vec::new();
    let _ = (&mut stdout).take(cap).read_to_end(&mut buf).await;
    let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[derive(Deserialize)]
struct ResultLine {
    status: String,
    runtime_seconds: f64,
}

/// Scan captured output for the last sentinel result line.
fn parse_result(output: &str) -> Option<ExecutionResult> {
    for line in output.lines().rev() {
        let Some(rest) = line.trim().strip_prefix(harness::RESULT_MARKER) else {
            continue;
        };
        let Ok(parsed) = serde_json::from_str::<ResultLine>(rest.trim()) else {
            continue;
        };
        let Ok(status) = parsed.status.parse::<ExecutionStatus>() else {
            continue;
        };
        return Some(ExecutionResult {
            status,
            runtime_seconds: parsed.runtime_seconds,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_result_reads_a_sentinel_line() {
        let output = format!(
            "{} {{\"status\": \"passed\", \"runtime_seconds\": 0.25}}\n",
            harness::RESULT_MARKER
        );
        let result = parse_result(&output).unwrap();
        assert_eq!(result.status, ExecutionStatus::Passed);
        assert!((result.runtime_seconds - 0.25).abs() < 1e-9);
    }

    #[test]
    fn parse_result_takes_the_last_sentinel_line() {
        let output = format!(
            "candidate noise\n{m} {{\"status\": \"passed\", \"runtime_seconds\": 0.1}}\n{m} {{\"status\": \"failed\", \"runtime_seconds\": 0.2}}\n",
            m = harness::RESULT_MARKER
        );
        let result = parse_result(&output).unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
    }

    #[test]
    fn parse_result_maps_fatal_messages() {
        let output = format!(
            "{} {{\"status\": \"fatal:os.remove is disabled inside the sandbox\", \"runtime_seconds\": 0.05}}\n",
            harness::RESULT_MARKER
        );
        let result = parse_result(&output).unwrap();
        assert_eq!(
            result.status,
            ExecutionStatus::Fatal("os.remove is disabled inside the sandbox".to_string())
        );
    }

    #[test]
    fn parse_result_ignores_garbage() {
        assert!(parse_result("").is_none());
        assert!(parse_result("no marker here\n").is_none());
        let unparseable = format!("{} not json\n", harness::RESULT_MARKER);
        assert!(parse_result(&unparseable).is_none());
    }
}
