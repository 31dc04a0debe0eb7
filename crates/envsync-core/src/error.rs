use thiserror::Error;

/// Core error types for envsync operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid target id: {0}")]
    InvalidTarget(String),

    #[error("Duplicate key '{key}' for target {target}")]
    DuplicateKey { target: String, key: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidKey error
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Create a new InvalidTarget error
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget(message.into())
    }

    /// Create a new DuplicateKey error
    pub fn duplicate_key(target: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            target: target.into(),
            key: key.into(),
        }
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidKey(_) | Self::InvalidTarget(_) | Self::DuplicateKey { .. } => {
                ErrorCategory::Validation
            }
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_error() {
        let err = CoreError::invalid_key("key must not be empty");
        assert_eq!(err.to_string(), "Invalid key: key must not be empty");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_duplicate_key_error() {
        let err = CoreError::duplicate_key("orders-fn", "API_URL");
        assert_eq!(
            err.to_string(),
            "Duplicate key 'API_URL' for target orders-fn"
        );
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_json_error_category() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), ErrorCategory::Serialization);
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
    }
}
