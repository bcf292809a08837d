pub mod scorer;
pub mod types;

pub use scorer::Scorer;
pub use types::{
    AttemptResult, BatchRequest, EvaluationTask, ExecutionResult, ExecutionStatus, TaskReport,
    TaskResultSet, TestCase,
};
