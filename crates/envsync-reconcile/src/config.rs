//! Reconciliation settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Settings shared by the executor, chain runner and lifecycle handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Upper bound for one unit, backoff included. 0 disables the bound.
    #[serde(default = "default_unit_timeout_secs")]
    pub unit_timeout_secs: u64,

    /// Re-run units whose value and staleness token are already recorded.
    #[serde(default)]
    pub force: bool,

    /// Executor scope used when a request does not name one.
    #[serde(default = "default_scope")]
    pub default_scope: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            unit_timeout_secs: default_unit_timeout_secs(),
            force: false,
            default_scope: default_scope(),
        }
    }
}

fn default_unit_timeout_secs() -> u64 {
    900
}

fn default_scope() -> String {
    "default".to_string()
}

impl ReconcileConfig {
    /// Create a config for testing with short delays and no unit bound.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            retry: RetryPolicy::for_testing(),
            unit_timeout_secs: 0,
            force: false,
            default_scope: default_scope(),
        }
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        (self.unit_timeout_secs > 0).then(|| Duration::from_secs(self.unit_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        if self.default_scope.trim().is_empty() {
            return Err("reconcile.default_scope must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.unit_timeout(), Some(Duration::from_secs(900)));
        assert!(!config.force);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        assert_eq!(ReconcileConfig::for_testing().unit_timeout(), None);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ReconcileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReconcileConfig::default());
    }

    #[test]
    fn test_validate_propagates_retry_errors() {
        let mut config = ReconcileConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ReconcileConfig::default();
        config.default_scope = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
