use crate::types::ExecutionStatus;

/// Boundary contract for the downstream efficiency scorer.
///
/// The engine supplies only the raw measurement: a status and a wall-clock
/// runtime per attempt. Turning that measurement into a percentile-style
/// score against a task's historical runtime distribution happens outside
/// the core, behind this trait.
pub trait Scorer {
    /// `distribution` is the task's historical runtimes sorted ascending.
    /// Returns a score in `[0, 1]`; non-passing attempts conventionally
    /// score 0.
    fn score(
        &self,
        distribution: &[f64],
        runtime_seconds: f64,
        status: &ExecutionStatus,
    ) -> f64;
}
