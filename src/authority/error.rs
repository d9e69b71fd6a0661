//! Error taxonomy for session operations.

use thiserror::Error;

use crate::jwt::CodecError;

/// Failure talking to a backing store (database or secret cache).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("backend call timed out")]
    Timeout,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by create, extend, delete and list.
///
/// Verify never returns these; it folds every failure into `valid = false`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session matches the presented user, refresh token and auth token.
    #[error("session not found")]
    NotFound,
    /// The presented credential failed its signature, type or expiry check.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Well-formed request rejected by policy.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        SessionError::Internal(e.to_string())
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Encoding(inner) => SessionError::Internal(inner.to_string()),
            other => SessionError::Unauthenticated(other.to_string()),
        }
    }
}
