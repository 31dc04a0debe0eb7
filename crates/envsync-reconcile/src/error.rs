use std::time::Duration;

use envsync_core::{CoreError, Operation, TargetId};
use envsync_remote::RemoteError;
use thiserror::Error;

/// Errors surfaced by reconciliation.
///
/// Every unit-level variant names the target, key and operation so a failure
/// can be traced back to the declaration that produced it.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to {operation} key '{key}' on {target} (attempt {attempts}): {source}")]
    Fatal {
        target: TargetId,
        key: String,
        operation: Operation,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error(
        "Gave up trying to {operation} key '{key}' on {target} after {attempts} conflicting attempts: {source}"
    )]
    ConflictExhausted {
        target: TargetId,
        key: String,
        operation: Operation,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Cancelled {operation} of key '{key}' on {target} after {timeout:?}")]
    TimeoutCancelled {
        target: TargetId,
        key: String,
        operation: Operation,
        timeout: Duration,
    },

    #[error("Invalid reconciliation unit: {0}")]
    InvalidUnit(#[from] CoreError),

    #[error("Chain task for {target} did not complete: {message}")]
    Chain { target: String, message: String },
}

impl ReconcileError {
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Fatal { target, .. }
            | Self::ConflictExhausted { target, .. }
            | Self::TimeoutCancelled { target, .. } => Some(target.as_str()),
            Self::Chain { target, .. } => Some(target),
            Self::InvalidUnit(_) => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Fatal { key, .. }
            | Self::ConflictExhausted { key, .. }
            | Self::TimeoutCancelled { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Remote error that ended the unit, if any.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Fatal { source, .. } | Self::ConflictExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Attempts made before giving up.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Fatal { attempts, .. } | Self::ConflictExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutCancelled { .. })
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Exhausted retries surface the same way as any non-retryable failure.
            Self::Fatal { .. } | Self::ConflictExhausted { .. } => ErrorCategory::Fatal,
            Self::TimeoutCancelled { .. } => ErrorCategory::Timeout,
            Self::InvalidUnit(_) => ErrorCategory::Validation,
            Self::Chain { .. } => ErrorCategory::Internal,
        }
    }
}

/// Error categories for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Fatal,
    Timeout,
    Validation,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetId {
        TargetId::new("orders-fn").unwrap()
    }

    #[test]
    fn test_fatal_message_names_target_key_and_cause() {
        let err = ReconcileError::Fatal {
            target: target(),
            key: "DB_URL".to_string(),
            operation: Operation::Apply,
            attempts: 1,
            source: RemoteError::access_denied("orders-fn", "not authorized"),
        };
        let msg = err.to_string();
        assert!(msg.contains("orders-fn"));
        assert!(msg.contains("DB_URL"));
        assert!(msg.contains("apply"));
        assert!(msg.contains("not authorized"));
        assert_eq!(err.category(), ErrorCategory::Fatal);
        assert_eq!(err.key(), Some("DB_URL"));
    }

    #[test]
    fn test_exhaustion_is_categorized_as_fatal() {
        let err = ReconcileError::ConflictExhausted {
            target: target(),
            key: "B".to_string(),
            operation: Operation::Remove,
            attempts: 10,
            source: RemoteError::conflict("orders-fn", "update in progress"),
        };
        assert_eq!(err.category(), ErrorCategory::Fatal);
        assert_eq!(err.attempts(), Some(10));
        assert!(err.remote_error().is_some_and(RemoteError::is_conflict));
        assert!(err.to_string().contains("10 conflicting attempts"));
    }

    #[test]
    fn test_timeout_category() {
        let err = ReconcileError::TimeoutCancelled {
            target: target(),
            key: "B".to_string(),
            operation: Operation::Apply,
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_timeout());
        assert_eq!(err.category().to_string(), "timeout");
        assert!(err.remote_error().is_none());
    }

    #[test]
    fn test_invalid_unit_from_core_error() {
        let err: ReconcileError = CoreError::invalid_key("key must not be empty").into();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.target().is_none());
    }
}
