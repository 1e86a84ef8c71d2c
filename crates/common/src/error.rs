//! Canonical error taxonomy for the query service
//!
//! Every crate in the workspace reports failures through this one enum so
//! callers (the proxy/router above us) can make retry and failover
//! decisions from the code alone, without parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors, one variant per canonical code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Error {
    /// Unknown transaction id, dtid, prepared name, or table.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate create. Documented call sites tolerate exact replays.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Operation is invalid in the current state of its target.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Concurrency or connection limit reached.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Tablet is not serving; safe to retry elsewhere.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Durability write failed; transaction state was rolled back.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Caller-initiated cancellation or deadline expiry.
    #[error("canceled: {0}")]
    Canceled(String),

    /// Malformed request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Bug or broken invariant on the tablet itself.
    #[error("internal: {0}")]
    Internal(String),
}

/// Bare error code, for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    ResourceExhausted,
    Unavailable,
    Aborted,
    Canceled,
    InvalidArgument,
    Internal,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Error::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            Error::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            Error::Unavailable(_) => ErrorCode::Unavailable,
            Error::Aborted(_) => ErrorCode::Aborted,
            Error::Canceled(_) => ErrorCode::Canceled,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Transient conditions the caller may retry, possibly on another
    /// tablet. State-machine violations are deliberately not retryable here;
    /// retry semantics for distributed transactions belong to the layer
    /// coordinating the shards.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::Unavailable | ErrorCode::ResourceExhausted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(
            Error::NotFound("txn 7".into()).code(),
            ErrorCode::NotFound
        );
        assert_eq!(Error::Aborted("fsync".into()).code(), ErrorCode::Aborted);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Unavailable("not serving".into()).is_retryable());
        assert!(Error::ResourceExhausted("tx pool full".into()).is_retryable());
        assert!(!Error::NotFound("gone".into()).is_retryable());
        assert!(!Error::FailedPrecondition("decided".into()).is_retryable());
    }
}
