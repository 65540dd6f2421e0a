//! Error type surfaced by [`crate::client::GeostageClient`].

use thiserror::Error;

/// Result type returned by every `GeostageClient` method.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Failure modes talking to the daemon's RPC endpoint.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("could not reach daemon: {0}")]
    Connection(String),

    #[error("daemon rejected call ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("failed to encode/decode job payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid daemon URL: {0}")]
    InvalidUrl(String),

    #[error("transport error talking to daemon: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl From<jsonrpsee::core::ClientError> for SdkError {
    fn from(e: jsonrpsee::core::ClientError) -> Self {
        match e {
            jsonrpsee::core::ClientError::Call(call_err) => SdkError::Rpc {
                code: call_err.code(),
                message: call_err.message().to_string(),
            },
            jsonrpsee::core::ClientError::Transport(e) => {
                SdkError::Transport(format!("transport error: {}", e))
            }
            jsonrpsee::core::ClientError::RestartNeeded(_) => {
                SdkError::Connection("daemon connection needs to be restarted".to_string())
            }
            jsonrpsee::core::ClientError::ParseError(e) => {
                SdkError::Other(format!("failed to parse daemon response: {}", e))
            }
            _ => SdkError::Other(e.to_string()),
        }
    }
}
