//! Unified error handling for the herald crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain-specific errors usable at module boundaries.
//!
//! The split mirrors the runtime failure taxonomy: configuration problems are
//! fatal at startup, external-call failures are classified transient or
//! permanent and drive the retry policy, and everything else is local to the
//! platform being processed.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::dispatch::DispatchError;
pub use crate::pool::PoolError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// External collaborator failures (trend scan, generation, publish)
    External,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Dispatch and scheduling errors
    Dispatch,
    /// Other/unknown errors
    Other,
}

/// Failure reported by an external collaborator call.
///
/// Transient failures (timeouts, rate limits) enter the retry policy;
/// permanent failures (rejected payload, bad credentials) do not.
#[derive(Error, Debug, Clone)]
pub enum ExternalError {
    #[error("transient external error: {0}")]
    Transient(String),

    #[error("permanent external error: {0}")]
    Permanent(String),
}

impl ExternalError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Whether the retry policy applies to this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Unified error type for the herald crate
#[derive(Error, Debug)]
pub enum Error {
    /// Content pool errors
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Post dispatch errors
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// External collaborator errors
    #[error("external error: {0}")]
    External(#[from] ExternalError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is recoverable (the pipeline may retry later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Pool(e) => e.is_recoverable(),
            Self::Dispatch(e) => e.is_recoverable(),
            Self::External(e) => e.is_transient(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Pool(_) | Self::Io(_) | Self::Json(_) => ErrorCategory::Storage,
            Self::Dispatch(_) => ErrorCategory::Dispatch,
            Self::External(_) => ErrorCategory::External,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_error_classification() {
        assert!(ExternalError::transient("timeout").is_transient());
        assert!(!ExternalError::permanent("auth rejected").is_transient());
    }

    #[test]
    fn test_config_error_not_recoverable() {
        let err = Error::config("missing slot template");
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_transient_external_is_recoverable() {
        let err: Error = ExternalError::transient("rate limit").into();
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::External);
    }
}
