//! RPC Error Types
//!
//! Maps `AppError` to JSON-RPC error codes (SPEC_FULL §7: `4xxx` caller
//! errors, `5xxx` infrastructure errors).

use geostage_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const UNKNOWN_JOB_TYPE: i32 = 4004;
    pub const PREFLIGHT_FAILED: i32 = 4005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const BROKER_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(issues) => ErrorObjectOwned::owned(
            code::VALIDATION_ERROR,
            issues
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("; "),
            None::<()>,
        ),
        AppError::Preflight(msg) => {
            ErrorObjectOwned::owned(code::PREFLIGHT_FAILED, msg, None::<()>)
        }
        AppError::UnknownJobType(job_type) => ErrorObjectOwned::owned(
            code::UNKNOWN_JOB_TYPE,
            format!("unknown job type: {job_type}"),
            None::<()>,
        ),
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Conflict(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        AppError::Broker(msg) => ErrorObjectOwned::owned(code::BROKER_ERROR, msg, None::<()>),
        AppError::TransientInfrastructure(msg) => {
            ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>)
        }
        AppError::PermanentHandler(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::Throttling(msg) => ErrorObjectOwned::owned(code::THROTTLED, msg, None::<()>),
        AppError::CorruptState(msg) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>)
        }
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Io(e) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>),
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Config(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
        AppError::InvalidState(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
    }
}
