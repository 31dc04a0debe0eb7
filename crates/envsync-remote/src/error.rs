//! Remote configuration error types.
//!
//! Every failure of a remote call is classified exactly once, at the call
//! site, into a [`FailureClass`]. Only [`FailureClass::Conflict`] is retried.

use std::fmt;

/// Service error codes that mean "another update is already in flight".
const CONFLICT_CODES: &[&str] = &[
    "ResourceConflictException",
    "ConflictException",
    "OperationInProgressException",
];

/// Message fragments that indicate an in-flight update. Only consulted when
/// the service did not report a structured code.
const CONFLICT_MESSAGE_HINTS: &[&str] = &[
    "update is in progress",
    "update in progress",
    "operation in progress",
    "resourceconflictexception",
    "concurrent modification",
];

/// Errors returned by a remote configuration backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The write was rejected because another update to the target is in flight.
    #[error("Update already in progress for {target}: {message}")]
    Conflict {
        /// The target whose update collided.
        target: String,
        /// Detail reported by the remote.
        message: String,
    },

    /// The target does not exist.
    #[error("Target not found: {target}")]
    NotFound {
        /// The missing target.
        target: String,
    },

    /// The caller is not allowed to read or modify the target.
    #[error("Access denied for {target}: {message}")]
    AccessDenied {
        /// The target that was refused.
        target: String,
        /// Detail reported by the remote.
        message: String,
    },

    /// The remote throttled the request.
    #[error("Request throttled for {target}: {message}")]
    Throttled {
        /// The throttled target.
        target: String,
        /// Detail reported by the remote.
        message: String,
    },

    /// The remote could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An error reported by the remote service that has no dedicated variant.
    ///
    /// `code` is the structured error kind when the service exposes one.
    #[error("Service error [{}]: {message}", .code.as_deref().unwrap_or("unclassified"))]
    Service {
        /// Structured error code, if any.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl RemoteError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(target: impl Into<String>) -> Self {
        Self::NotFound {
            target: target.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AccessDenied {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Throttled` error.
    #[must_use]
    pub fn throttled(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Throttled {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Service` error carrying a structured code.
    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Creates a `Service` error for a remote that exposes no structured code.
    #[must_use]
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Service {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies this failure.
    ///
    /// Structured kinds decide on their own. A `Service` error is matched by
    /// its code when present and by message text only when it has no code.
    #[must_use]
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Conflict { .. } => FailureClass::Conflict,
            Self::Service {
                code: Some(code), ..
            } => {
                if CONFLICT_CODES.contains(&code.as_str()) {
                    FailureClass::Conflict
                } else {
                    FailureClass::Fatal
                }
            }
            Self::Service {
                code: None,
                message,
            } => {
                if message_indicates_conflict(message) {
                    FailureClass::Conflict
                } else {
                    FailureClass::Fatal
                }
            }
            Self::NotFound { .. }
            | Self::AccessDenied { .. }
            | Self::Throttled { .. }
            | Self::Connection { .. }
            | Self::Internal { .. } => FailureClass::Fatal,
        }
    }

    /// Returns `true` if this failure is a retryable concurrent-update conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.classify() == FailureClass::Conflict
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::Throttled { .. } => ErrorCategory::Throttling,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Service { .. } if self.is_conflict() => ErrorCategory::Conflict,
            Self::Service { .. } => ErrorCategory::Service,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

fn message_indicates_conflict(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    CONFLICT_MESSAGE_HINTS
        .iter()
        .any(|hint| lowered.contains(hint))
}

/// Whether a failed remote call may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Another update is in flight; retry after backoff.
    Conflict,
    /// Anything else; never retried.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Categories of remote errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Concurrent update in flight.
    Conflict,
    /// Target not found.
    NotFound,
    /// Permission problem.
    Authorization,
    /// Rate limiting.
    Throttling,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Other service-reported error.
    Service,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::NotFound => write!(f, "not_found"),
            Self::Authorization => write!(f, "authorization"),
            Self::Throttling => write!(f, "throttling"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Service => write!(f, "service"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
