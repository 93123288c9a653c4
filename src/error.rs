// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the offline sync engine.
//!
//! Errors are split by where they originate (remote backend, local SQLite
//! store, configuration) and by how the sync coordinator must react to them.
//!
//! # Error Categories
//!
//! | Error Type | Network | Retryable | Description |
//! |------------|---------|-----------|-------------|
//! | `Network` | Yes | Yes | Fetch failure, connection refused, DNS |
//! | `Timeout` | Yes | Yes | Remote call lost the race against its timeout |
//! | `Rejected` | No | Yes (bounded) | Backend answered with an error code |
//! | `Unauthenticated` | No | Yes (bounded) | No signed-in user for an insert |
//! | `InvalidOperation` | No | No | Programmer error, never replayed |
//! | `Store` | No | No | Local SQLite errors (needs attention) |
//! | `Corrupt` | No | No | A local row could not be decoded |
//! | `Config` | No | No | Configuration invalid |
//! | `InvalidState` | No | No | Lifecycle violation (e.g. double `start()`) |
//! | `Shutdown` | No | No | Engine is shutting down |
//! | `Internal` | No | No | Unexpected internal error |
//!
//! # Network-shaped failures
//!
//! [`SyncError::is_network()`] decides whether a failure means "we cannot
//! reach the backend". Those failures are never surfaced to callers of
//! `execute_operation`: the mutation is queued instead and the connectivity
//! monitor is forced offline. Everything else is a domain answer and goes
//! straight back to the caller.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while executing, queueing or replaying mutations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure talking to the remote backend.
    ///
    /// The request never produced a server answer (connection refused,
    /// DNS failure, reset). Treated as loss of connectivity.
    #[error("Network error ({operation}): {message}")]
    Network { operation: String, message: String },

    /// A remote call did not settle before its timeout.
    ///
    /// Treated identically to a transport failure.
    #[error("Timed out after {timeout:?} ({operation})")]
    Timeout { operation: String, timeout: Duration },

    /// The backend answered and refused the request.
    ///
    /// Validation failures, constraint violations, row-level security
    /// denials and expired sessions all land here. Never queued from
    /// `execute_operation`, since replaying cannot change the answer.
    #[error("Rejected by backend ({code}): {message}")]
    Rejected { code: String, message: String },

    /// An insert needs the current user id and nobody is signed in.
    #[error("No authenticated user for this operation")]
    Unauthenticated,

    /// The operation itself is malformed.
    ///
    /// Programmer error: surfaced immediately, abandoned when found in the queue.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// SQLite error in the local durable store.
    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A row in the local store could not be decoded.
    #[error("Corrupt local row: {0}")]
    Corrupt(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lifecycle violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a network error for the named operation.
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Check if this failure means the backend is unreachable.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Check if replaying this operation can never succeed.
    ///
    /// Queue entries failing with a permanent error are abandoned without
    /// spending their retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Timeout { .. } => true,
            Self::Rejected { .. } => true, // bounded by the drain retry budget
            Self::Unauthenticated => true, // user may sign in before next pass
            Self::InvalidOperation(_) => false,
            Self::Store(_) => false,
            Self::Corrupt(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::Store(_) => "store",
            Self::Corrupt(_) => "corrupt",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Shutdown => "shutdown",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_network_shaped() {
        let err = SyncError::network("insert expenses", "connection refused");
        assert!(err.is_network());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("insert expenses"));

        let err = SyncError::timeout("update debts", Duration::from_secs(10));
        assert!(err.is_network());
        assert!(err.to_string().contains("update debts"));
    }

    #[test]
    fn test_rejected_is_not_network() {
        let err = SyncError::Rejected {
            code: "23502".to_string(),
            message: "null value in column \"amount\"".to_string(),
        };
        assert!(!err.is_network());
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("23502"));
    }

    #[test]
    fn test_invalid_operation_is_permanent() {
        let err = SyncError::InvalidOperation("update without target id".to_string());
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
        assert!(!err.is_network());
    }

    #[test]
    fn test_not_retryable_local_errors() {
        assert!(!SyncError::Config("bad duration".to_string()).is_retryable());
        assert!(!SyncError::Corrupt("bad json".to_string()).is_retryable());
        assert!(!SyncError::Shutdown.is_retryable());
        assert!(!SyncError::Internal("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_invalid_state_formatting() {
        let err = SyncError::InvalidState {
            expected: "Created".to_string(),
            actual: "Running".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Created"));
        assert!(msg.contains("Running"));
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_serde_error_maps_to_corrupt() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: SyncError = parse.unwrap_err().into();
        assert!(matches!(err, SyncError::Corrupt(_)));
    }
}
