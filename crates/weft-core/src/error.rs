// Error types for the reconciliation engine

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while driving a session
#[derive(Debug, Error)]
pub enum EngineError {
    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Session does not exist on the server
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// HTTP or stream transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A submission failed; `input` carries the text rolled back from the
    /// optimistic buffer so the caller can restore it for retry
    #[error("submission failed: {message}")]
    Submission { message: String, input: String },

    /// No session is open
    #[error("no active session")]
    NoActiveSession,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create an API error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        EngineError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        EngineError::Transport(msg.into())
    }

    /// Create a submission error carrying the rolled-back input
    pub fn submission(message: impl Into<String>, input: impl Into<String>) -> Self {
        EngineError::Submission {
            message: message.into(),
            input: input.into(),
        }
    }
}
