use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single hidden test case: raw input value(s) and the expected value(s),
/// in whatever shape the task's conversion harness understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
}

/// One evaluation attempt: a candidate solution plus the task-specific
/// harness code and test suite it is judged against.
///
/// Immutable once submitted; consumed by exactly one isolation process.
/// The payload is serialized across the isolation boundary, never shared live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub task_id: String,
    /// Assigned by the caller at submission time, so downstream ordering and
    /// pass@k grouping survive completion races.
    pub attempt_index: u32,
    pub solution_source: String,
    pub convert_source: String,
    pub evaluate_source: String,
    /// Method name on the candidate's `Solution` object that the harness invokes.
    pub entry_point: String,
    pub test_cases: Vec<TestCase>,
    pub timeout_seconds: f64,
}

/// Terminal outcome of one attempt.
///
/// Wire form is a plain string: `"passed"`, `"failed"`, `"timed_out"` or
/// `"fatal:<message>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every test case evaluated true and the suite was non-empty.
    Passed,
    /// At least one test case did not hold, or a handled exception occurred.
    Failed,
    /// The inner deadline or the supervisor's outer bound fired.
    TimedOut,
    /// A capability violation or an uncaught low-level fault escaped the
    /// guarded region.
    Fatal(String),
}

impl ExecutionStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, ExecutionStatus::Passed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Passed => f.write_str("passed"),
            ExecutionStatus::Failed => f.write_str("failed"),
            ExecutionStatus::TimedOut => f.write_str("timed_out"),
            ExecutionStatus::Fatal(message) => write!(f, "fatal:{message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseStatusError(String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized execution status: {:?}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(ExecutionStatus::Passed),
            "failed" => Ok(ExecutionStatus::Failed),
            "timed_out" => Ok(ExecutionStatus::TimedOut),
            other => match other.strip_prefix("fatal:") {
                Some(message) => Ok(ExecutionStatus::Fatal(message.to_string())),
                None => Err(ParseStatusError(other.to_string())),
            },
        }
    }
}

impl Serialize for ExecutionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExecutionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Definitive outcome of one attempt. `runtime_seconds` is always present,
/// measured by whichever layer detected the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub runtime_seconds: f64,
}

/// One completed attempt as stored in a [`TaskResultSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_index: u32,
    pub result: ExecutionResult,
}

/// Per-task result accumulation: `task_id -> attempts in arrival order`.
///
/// Arrival order is completion order, not attempt order; use
/// [`TaskResultSet::sorted_attempts`] to recover submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResultSet {
    results: HashMap<String, Vec<AttemptResult>>,
}

impl TaskResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one attempt's result. Append-only; a `(task_id, attempt_index)`
    /// pair is recorded exactly once per submission.
    pub fn record(&mut self, task_id: String, attempt_index: u32, result: ExecutionResult) {
        self.results
            .entry(task_id)
            .or_default()
            .push(AttemptResult {
                attempt_index,
                result,
            });
    }

    pub fn attempts(&self, task_id: &str) -> Option<&[AttemptResult]> {
        self.results.get(task_id).map(Vec::as_slice)
    }

    /// Attempts for a task sorted by `attempt_index`.
    pub fn sorted_attempts(&self, task_id: &str) -> Vec<AttemptResult> {
        let mut attempts = self
            .results
            .get(task_id)
            .cloned()
            .unwrap_or_default();
        attempts.sort_by_key(|a| a.attempt_index);
        attempts
    }

    pub fn task_count(&self) -> usize {
        self.results.len()
    }

    pub fn attempt_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AttemptResult>)> {
        self.results.iter()
    }

    /// Flatten into the per-task wire reports, preserving arrival order.
    pub fn into_reports(self) -> HashMap<String, Vec<TaskReport>> {
        self.results
            .into_iter()
            .map(|(task_id, attempts)| {
                let reports = attempts
                    .into_iter()
                    .map(|a| TaskReport {
                        task_id: task_id.clone(),
                        attempt_index: a.attempt_index,
                        status: a.result.status,
                        runtime_seconds: a.result.runtime_seconds,
                    })
                    .collect();
                (task_id, reports)
            })
            .collect()
    }
}

/// Batch submission: the full task list plus the worker budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub tasks: Vec<EvaluationTask>,
    pub worker_count: usize,
}

/// Per-attempt wire report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub attempt_index: u32,
    pub status: ExecutionStatus,
    pub runtime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_strings() {
        assert_eq!(ExecutionStatus::Passed.to_string(), "passed");
        assert_eq!(ExecutionStatus::Failed.to_string(), "failed");
        assert_eq!(ExecutionStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(
            ExecutionStatus::Fatal("os.remove is disabled".into()).to_string(),
            "fatal:os.remove is disabled"
        );
    }

    #[test]
    fn status_round_trips_through_parse() {
        for s in ["passed", "failed", "timed_out", "fatal:boom", "fatal:a:b:c"] {
            let status: ExecutionStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("exploded".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_string() {
        let json = serde_json::to_string(&ExecutionStatus::Fatal("x".into())).unwrap();
        assert_eq!(json, "\"fatal:x\"");
        let back: ExecutionStatus = serde_json::from_str("\"timed_out\"").unwrap();
        assert_eq!(back, ExecutionStatus::TimedOut);
    }

    #[test]
    fn task_deserializes_from_submission_contract() {
        let task: EvaluationTask = serde_json::from_str(
            r#"{
                "task_id": "two-sum",
                "attempt_index": 3,
                "solution_source": "class Solution: pass",
                "convert_source": "def convert_offline(pair): return pair",
                "evaluate_source": "def evaluate_offline(i, o, e): return o == e",
                "entry_point": "twoSum",
                "test_cases": [{"input": [[2, 7], 9], "expected": [0, 1]}],
                "timeout_seconds": 30.0
            }"#,
        )
        .unwrap();
        assert_eq!(task.task_id, "two-sum");
        assert_eq!(task.attempt_index, 3);
        assert_eq!(task.test_cases.len(), 1);
        assert!((task.timeout_seconds - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sorted_attempts_recovers_submission_order() {
        let mut set = TaskResultSet::new();
        // Completion order is racy; arrival order here is 2, 0, 1.
        for index in [2u32, 0, 1] {
            set.record(
                "t".into(),
                index,
                ExecutionResult {
                    status: ExecutionStatus::Passed,
                    runtime_seconds: 0.1,
                },
            );
        }
        let arrival: Vec<u32> = set.attempts("t").unwrap().iter().map(|a| a.attempt_index).collect();
        assert_eq!(arrival, vec![2, 0, 1]);
        let sorted: Vec<u32> = set
            .sorted_attempts("t")
            .iter()
            .map(|a| a.attempt_index)
            .collect();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn reports_carry_task_and_attempt_identity() {
        let mut set = TaskResultSet::new();
        set.record(
            "a".into(),
            0,
            ExecutionResult {
                status: ExecutionStatus::Failed,
                runtime_seconds: 1.5,
            },
        );
        let reports = set.into_reports();
        let report = &reports["a"][0];
        assert_eq!(report.task_id, "a");
        assert_eq!(report.attempt_index, 0);
        assert_eq!(report.status, ExecutionStatus::Failed);
    }
}
