//! ReconcileExecutor - applies one reconciliation unit with conflict retry.
//!
//! Each attempt performs exactly one fetch of the target's current variables,
//! merges the unit in, and performs exactly one full write. A write (or fetch)
//! rejected because another update is in flight sleeps with doubling backoff
//! and starts over from a fresh fetch. Any other failure ends the unit.

use std::time::Duration;

use envsync_core::{ReconciliationUnit, merge};
use envsync_remote::{DynRemote, FailureClass, RemoteError};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::retry::{RetryPolicy, RetryState};

/// Result of a successfully applied unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Identifier reported for the unit. Always the unit's key.
    pub physical_id: String,
    /// Value for the `outputKey` attribute. Always the unit's key.
    pub output_key: String,
    /// Fetch+write attempts used, starting at 1.
    pub attempts: u32,
}

impl ReconcileOutcome {
    fn for_unit(unit: &ReconciliationUnit, attempts: u32) -> Self {
        Self {
            physical_id: unit.key().to_string(),
            output_key: unit.key().to_string(),
            attempts,
        }
    }
}

/// Executes reconciliation units against one remote.
///
/// The executor holds no per-unit state, so a single instance can be shared
/// by every unit in its scope.
pub struct ReconcileExecutor {
    remote: DynRemote,
    policy: RetryPolicy,
}

impl ReconcileExecutor {
    pub fn new(remote: DynRemote, policy: RetryPolicy) -> Self {
        Self { remote, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.remote.backend_name()
    }

    /// Applies `unit` to its target's remote configuration.
    pub async fn execute(&self, unit: &ReconciliationUnit) -> Result<ReconcileOutcome, ReconcileError> {
        let target = unit.target_id();
        let mut retry = self.policy.start();

        loop {
            debug!(
                target = %target,
                key = unit.key(),
                operation = %unit.operation(),
                attempt = retry.attempt(),
                "Fetching current configuration"
            );

            let current = match self.remote.fetch(target).await {
                Ok(vars) => vars,
                Err(e) => {
                    let delay = self.backoff_or_fail(unit, &mut retry, e)?;
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let desired = merge(&current, unit.operation(), unit.key(), unit.value());

            match self.remote.write(target, &desired).await {
                Ok(()) => {
                    info!(
                        target = %target,
                        key = unit.key(),
                        operation = %unit.operation(),
                        attempts = retry.attempt(),
                        "Reconciled key"
                    );
                    return Ok(ReconcileOutcome::for_unit(unit, retry.attempt()));
                }
                Err(e) => {
                    let delay = self.backoff_or_fail(unit, &mut retry, e)?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), bounded by `timeout`.
    ///
    /// On expiry the in-flight attempt and any pending backoff are dropped and
    /// no further remote call is made for the unit.
    pub async fn execute_with_timeout(
        &self,
        unit: &ReconciliationUnit,
        timeout: Option<Duration>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(timeout) = timeout else {
            return self.execute(unit).await;
        };

        tokio::time::timeout(timeout, self.execute(unit))
            .await
            .map_err(|_| {
                warn!(
                    target = %unit.target_id(),
                    key = unit.key(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Reconciliation cancelled"
                );
                ReconcileError::TimeoutCancelled {
                    target: unit.target_id().clone(),
                    key: unit.key().to_string(),
                    operation: unit.operation(),
                    timeout,
                }
            })?
    }

    /// Classifies a failed call: returns the delay before the next attempt,
    /// or the error that ends the unit.
    fn backoff_or_fail(
        &self,
        unit: &ReconciliationUnit,
        retry: &mut RetryState,
        error: RemoteError,
    ) -> Result<Duration, ReconcileError> {
        let attempts = retry.attempt();

        if error.classify() == FailureClass::Fatal {
            warn!(
                target = %unit.target_id(),
                key = unit.key(),
                attempt = attempts,
                category = %error.category(),
                error = %error,
                "Non-retryable remote failure"
            );
            return Err(ReconcileError::Fatal {
                target: unit.target_id().clone(),
                key: unit.key().to_string(),
                operation: unit.operation(),
                attempts,
                source: error,
            });
        }

        match retry.next_backoff() {
            Some(delay) => {
                warn!(
                    target = %unit.target_id(),
                    key = unit.key(),
                    attempt = attempts,
                    max_attempts = self.policy.max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %error,
                    "Concurrent update in progress, retrying"
                );
                Ok(delay)
            }
            None => {
                warn!(
                    target = %unit.target_id(),
                    key = unit.key(),
                    attempts,
                    "Conflict retries exhausted"
                );
                Err(ReconcileError::ConflictExhausted {
                    target: unit.target_id().clone(),
                    key: unit.key().to_string(),
                    operation: unit.operation(),
                    attempts,
                    source: error,
                })
            }
        }
    }
}

impl std::fmt::Debug for ReconcileExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileExecutor")
            .field("backend", &self.remote.backend_name())
            .field("policy", &self.policy)
            .finish()
    }
}
