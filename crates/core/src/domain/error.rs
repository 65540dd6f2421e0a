// Domain error types — pure invariant violations, no infrastructure concerns.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid job state transition: {from} -> {to}")]
    InvalidJobTransition { from: String, to: String },

    #[error("invalid task state transition: {from} -> {to}")]
    InvalidTaskTransition { from: String, to: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("stage {stage} out of range [1, {total_stages}]")]
    StageOutOfRange { stage: i32, total_stages: i32 },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
