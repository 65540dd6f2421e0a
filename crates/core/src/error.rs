// Central error type for the application, closing over the error taxonomy
// of spec §7 (kinds, not type names — this enum is the closed sum type
// the design notes ask for).

use thiserror::Error;

/// A single field-level validation failure (spec §4.3 "a list of per-field
/// issues").
#[derive(Debug, Clone)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// ValidationError — parameters failed schema check.
    #[error("validation failed: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<FieldIssue>),

    /// PreflightError — a resource validator rejected the submission.
    #[error("preflight check failed: {0}")]
    Preflight(String),

    /// UnknownJobType — registry miss.
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    /// TransientInfrastructureError — broker/store/blob temporarily unavailable.
    #[error("transient infrastructure error: {0}")]
    TransientInfrastructure(String),

    /// PermanentHandlerError — handler rejected the input semantically.
    #[error("permanent handler error: {0}")]
    PermanentHandler(String),

    /// ThrottlingError — external dependency returned rate-limit.
    #[error("throttled: {0}")]
    Throttling(String),

    /// CorruptState — an invariant the janitor could not reconcile.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// From implementations for infra crates (to avoid circular dependency)
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Database(err)
    }
}

// Note: sqlx::Error conversion is handled in infra-postgres crate
// by converting to AppError::Database(String)
