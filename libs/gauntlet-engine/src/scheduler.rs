/// Execution Scheduler - Bounded-Concurrency Dispatch
///
/// **Core Responsibility:**
/// Run many evaluation attempts in parallel under a fixed worker budget and
/// aggregate exactly one result per submitted task.
///
/// Isolation is structural (one process per attempt) and scheduling is
/// structural (a bounded `buffer_unordered` window), so a hung or fatal
/// attempt cannot stall the others. Results fan in to the single driving
/// task, which owns the accumulation map; there is no shared mutable
/// accumulator and no cross-key contention. Dropping the in-flight future
/// kills and reaps every spawned child via the supervisor's guarantees.
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use gauntlet_common::{EvaluationTask, TaskResultSet};
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;
use crate::supervisor::ProcessSupervisor;

/// Guardrails on pathological payloads, checked before any process spawns.
const MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MiB
const MAX_TEST_SUITE_BYTES: usize = 10 * 1024 * 1024; // 10MiB

/// The only caller-visible error path: a malformed batch rejected before
/// dispatch. Everything after dispatch terminates in a result.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("worker_count must be at least 1")]
    NoWorkers,
    #[error("task {task_id:?} attempt {attempt_index}: {reason}")]
    InvalidTask {
        task_id: String,
        attempt_index: u32,
        reason: String,
    },
}

pub struct ExecutionScheduler {
    supervisor: Arc<ProcessSupervisor>,
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ExecutionScheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            supervisor: Arc::new(ProcessSupervisor::new(config)),
        }
    }

    /// Run a batch of attempts with at most `worker_count` in flight.
    ///
    /// Yields exactly one result per task; within a task, list order is
    /// arrival order and callers sort by `attempt_index`.
    pub async fn submit(
        &self,
        tasks: Vec<EvaluationTask>,
        worker_count: usize,
    ) -> Result<TaskResultSet, SubmitError> {
        if worker_count == 0 {
            return Err(SubmitError::NoWorkers);
        }
        for task in &tasks {
            validate_task(task)?;
        }

        info!(
            tasks = tasks.len(),
            worker_count, "dispatching evaluation batch"
        );

        let mut in_flight = stream::iter(tasks.into_iter().map(|task| {
            let supervisor = Arc::clone(&self.supervisor);
            async move {
                let result = supervisor.run_attempt(&task).await;
                (task.task_id, task.attempt_index, result)
            }
        }))
        .buffer_unordered(worker_count);

        let mut results = TaskResultSet::new();
        while let Some((task_id, attempt_index, result)) = in_flight.next().await {
            info!(
                task_id = %task_id,
                attempt_index,
                status = %result.status,
                runtime_seconds = result.runtime_seconds,
                "attempt finished"
            );
            results.record(task_id, attempt_index, result);
        }
        Ok(results)
    }
}

fn validate_task(task: &EvaluationTask) -> Result<(), SubmitError> {
    let reject = |reason: String| SubmitError::InvalidTask {
        task_id: task.task_id.clone(),
        attempt_index: task.attempt_index,
        reason,
    };

    if task.task_id.is_empty() {
        return Err(reject("task_id is empty".into()));
    }
    if !is_python_identifier(&task.entry_point) {
        return Err(reject(format!(
            "entry_point {:?} is not a valid identifier",
            task.entry_point
        )));
    }
    if !task.timeout_seconds.is_finite() || task.timeout_seconds <= 0.0 {
        return Err(reject(format!(
            "timeout_seconds {} is not a positive finite number",
            task.timeout_seconds
        )));
    }
    for (name, source) in [
        ("solution_source", &task.solution_source),
        ("convert_source", &task.convert_source),
        ("evaluate_source", &task.evaluate_source),
    ] {
        if source.len() > MAX_SOURCE_BYTES {
            return Err(reject(format!(
                "{name} exceeds the {MAX_SOURCE_BYTES}-byte limit"
            )));
        }
    }
    let suite_bytes = serde_json::to_string(&task.test_cases)
        .map_err(|e| reject(format!("test_cases are not serializable: {e}")))?
        .len();
    if suite_bytes > MAX_TEST_SUITE_BYTES {
        return Err(reject(format!(
            "test suite exceeds the {MAX_TEST_SUITE_BYTES}-byte limit"
        )));
    }
    Ok(())
}

fn is_python_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
