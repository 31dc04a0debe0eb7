//! Executor registry.
//!
//! One executor is shared by every unit in a scope (for example one per
//! account/region or per deployment). Handles are created on first use and
//! reused afterwards.

use std::sync::Arc;

use dashmap::DashMap;
use envsync_remote::DynRemote;
use tracing::debug;

use crate::executor::ReconcileExecutor;
use crate::retry::RetryPolicy;

/// Shared handle to an executor.
pub type ExecutorHandle = Arc<ReconcileExecutor>;

/// Lazily creates one executor per scope.
pub struct ExecutorRegistry {
    remote: DynRemote,
    policy: RetryPolicy,
    executors: DashMap<String, ExecutorHandle>,
}

impl ExecutorRegistry {
    pub fn new(remote: DynRemote, policy: RetryPolicy) -> Self {
        Self {
            remote,
            policy,
            executors: DashMap::new(),
        }
    }

    /// Returns the executor for `scope`, creating it on first request.
    pub fn get_or_create(&self, scope: &str) -> ExecutorHandle {
        self.executors
            .entry(scope.to_string())
            .or_insert_with(|| {
                debug!(scope, "Creating reconcile executor");
                Arc::new(ReconcileExecutor::new(self.remote.clone(), self.policy.clone()))
            })
            .clone()
    }

    pub fn get(&self, scope: &str) -> Option<ExecutorHandle> {
        self.executors.get(scope).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Scopes with an executor, sorted.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        scopes.sort();
        scopes
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("backend", &self.remote.backend_name())
            .field("scopes", &self.scopes())
            .finish()
    }
}
