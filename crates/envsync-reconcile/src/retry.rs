//! Bounded exponential backoff for conflicting writes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry bounds for one reconciliation unit.
///
/// The delay starts at `initial_delay_ms` and doubles after every retryable
/// failure, capped at `max_delay_ms`. At most `max_attempts` fetch+write
/// attempts are made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt (ms)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the doubled delay (ms)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    10_000
}

fn default_max_delay_ms() -> u64 {
    40_000
}

fn default_max_attempts() -> u32 {
    10
}

impl RetryPolicy {
    /// Create a policy for testing with millisecond delays.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            initial_delay_ms: 10,
            max_delay_ms: 40,
            max_attempts: 10,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay slept between attempt `attempt` and `attempt + 1` (1-based):
    /// `min(initial * 2^(attempt - 1), max)`.
    ///
    /// Returns `None` when no attempt follows.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let delay = 2u32
            .checked_pow(attempt - 1)
            .and_then(|factor| self.initial_delay().checked_mul(factor))
            .map_or(self.max_delay(), |d| d.min(self.max_delay()));
        Some(delay)
    }

    /// Every delay a unit sleeps if all attempts conflict.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }

    /// Starts a fresh retry state for one unit.
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 1,
            delay: self.initial_delay().min(self.max_delay()),
            max_attempts: self.max_attempts,
            max_delay: self.max_delay(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "retry.initial_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

/// Attempt counter and current delay of one unit's execution.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
    max_attempts: u32,
    max_delay: Duration,
}

impl RetryState {
    /// Current attempt, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay that will be slept after the current attempt if it conflicts.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Moves past a retryable failure.
    ///
    /// Returns the delay to sleep before the next attempt, or `None` when
    /// the attempt budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }
        let delay = self.delay;
        self.delay = delay.saturating_mul(2).min(self.max_delay);
        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(10));
        assert_eq!(policy.max_delay(), Duration::from_secs(40));
        assert_eq!(policy.max_attempts, 10);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_schedule_doubles_and_caps() {
        let secs: Vec<u64> = RetryPolicy::default()
            .schedule()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(secs, vec![10, 20, 40, 40, 40, 40, 40, 40, 40]);
    }

    #[test]
    fn test_state_matches_policy_formula() {
        let policy = RetryPolicy::default();
        let mut state = policy.start();
        let mut attempt = 1;
        while let Some(delay) = state.next_backoff() {
            assert_eq!(Some(delay), policy.delay_after(attempt));
            attempt += 1;
            assert_eq!(state.attempt(), attempt);
        }
        assert_eq!(state.attempt(), policy.max_attempts);
        assert!(!state.can_retry());
        assert_eq!(state.next_backoff(), None);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::for_testing()
        };
        assert!(policy.schedule().is_empty());
        assert_eq!(policy.start().next_backoff(), None);
    }

    #[test]
    fn test_large_attempt_counts_do_not_overflow() {
        let policy = RetryPolicy {
            initial_delay_ms: u64::MAX / 2,
            max_delay_ms: u64::MAX,
            max_attempts: 100,
        };
        assert_eq!(policy.delay_after(99), Some(policy.max_delay()));
        let mut state = policy.start();
        for _ in 0..99 {
            assert!(state.next_backoff().is_some());
        }
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let zero = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = RetryPolicy {
            initial_delay_ms: 50,
            max_delay_ms: 10,
            max_attempts: 3,
        };
        assert!(inverted.validate().unwrap_err().contains("must not exceed"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 10_000);
        assert_eq!(policy.max_delay_ms, 40_000);
    }
}
