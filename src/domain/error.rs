// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Every precondition violation in the core surfaces as one of
// these variants. Nothing here is retried or defaulted: the
// caller gets the error and the step does not run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecError {
    #[error("tokenize expects exactly one sample per call (got {0}); set the map batch size to 1")]
    BatchSizeNotOne(usize),

    #[error("no eval task is set: pass one when building the encoder or call `set_eval_task()`")]
    EvalTaskNotSet,

    #[error("no training tasks are configured")]
    NoTrainingTasks,

    #[error("task '{task}' requires field '{field}' which the sample does not provide")]
    MissingField { task: String, field: String },

    #[error("user id '{0}' contains no numeric part")]
    InvalidUserId(String),

    #[error("user index {index} is outside the valid range 1..={n_users}")]
    UserIndexOutOfRange { index: i64, n_users: usize },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("batch has no {0}; it was not assembled for evaluation")]
    MissingBatchField(&'static str),

    #[error("expected {expected} generated sequences, got {got}")]
    PredictionCount { expected: usize, got: usize },
}
