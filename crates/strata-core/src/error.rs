//! Error types and result aliases for strata.
//!
//! Errors are structured for programmatic handling: callers branch on the
//! variant (a rejected vote versus an optimistic-concurrency conflict, say)
//! and surface the embedded context to users.

use std::fmt;
use std::time::Duration;

/// The result type used throughout strata.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strata operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource (table, snapshot, event, lease, ...) was not found.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Optimistic concurrency failure or a vote that contradicts an earlier one.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// A copied file is missing or does not match its recorded size.
    #[error("integrity violation at {path}: {message}")]
    IntegrityViolation {
        /// Object path that failed verification.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// A storage operation (stat, copy, delete, list) failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// How long the caller waited.
        elapsed: Duration,
    },

    /// A region took part in an operation it is not registered for.
    #[error("invalid region {region}: {message}")]
    InvalidRegion {
        /// The offending region.
        region: String,
        /// Why the region is not valid here.
        message: String,
    },

    /// A required region rejected a pending commit.
    #[error("commit rejected by region {region}: {reason}")]
    QuorumDenied {
        /// The region that voted to reject.
        region: String,
        /// The reason it gave.
        reason: String,
    },

    /// A state machine transition that is not allowed.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an integrity violation for `path`.
    #[must_use]
    pub fn integrity(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an invalid region error.
    #[must_use]
    pub fn invalid_region(region: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::InvalidRegion {
            region: region.to_string(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true when resubmitting the same work may succeed.
    ///
    /// Commit requests are time-stamped per attempt, so a conflict or timeout
    /// is resolved by a fresh attempt rather than by replaying the old one.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Timeout { .. } | Self::Conflict { .. }
        )
    }
}

/// Maps a poisoned in-memory lock to an internal error.
pub(crate) fn poison_err<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::internal("lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_resource() {
        let err = Error::not_found("snapshot", "s-1");
        assert_eq!(err.to_string(), "not found: snapshot with id s-1");
    }

    #[test]
    fn quorum_denied_carries_region_and_reason() {
        let err = Error::QuorumDenied {
            region: "eu-west".into(),
            reason: "schema drift".into(),
        };
        assert!(err.to_string().contains("eu-west"));
        assert!(err.to_string().contains("schema drift"));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::storage("io").is_retryable());
        assert!(Error::conflict("parent moved").is_retryable());
        assert!(
            Error::Timeout {
                operation: "approval",
                elapsed: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!Error::integrity("a", "missing").is_retryable());
        assert!(!Error::invalid_region("x", "not required").is_retryable());
    }
}
