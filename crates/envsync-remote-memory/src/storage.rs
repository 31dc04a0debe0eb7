use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use envsync_core::{EnvVars, TargetId};
use envsync_remote::{RemoteConfiguration, RemoteError};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Behaviour knobs for the in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct RemoteOptions {
    /// Simulated duration of a configuration update. Until it has elapsed
    /// after a committed write, further writes to the same target are
    /// rejected as conflicts, like a remote that allows one in-flight
    /// update at a time. Zero disables the window.
    pub update_latency: Duration,
    /// Create unknown targets on first write instead of failing with
    /// `NotFound`.
    pub create_missing: bool,
}

/// Persisted state of one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub vars: EnvVars,
    /// Incremented on every committed write.
    pub version: u64,
}

#[derive(Debug, Default)]
struct TargetSlot {
    record: TargetRecord,
    busy_until: Option<Instant>,
    failing_writes: VecDeque<RemoteError>,
    failing_fetches: VecDeque<RemoteError>,
}

impl TargetSlot {
    fn with_vars(vars: EnvVars) -> Self {
        Self {
            record: TargetRecord { vars, version: 1 },
            ..Default::default()
        }
    }

    fn is_busy(&self, now: Instant) -> bool {
        self.busy_until.is_some_and(|until| now < until)
    }
}

fn in_progress_message(target: &TargetId) -> String {
    format!(
        "The operation cannot be performed at this time. An update is in progress for resource: {target}"
    )
}

/// In-memory remote configuration backend.
///
/// This backend provides:
/// - One versioned key/value configuration per target
/// - Optional in-flight update windows that reject concurrent writes
/// - Scripted failure injection for fetches and writes
/// - Helpers to simulate other actors (overwrites, redeploy wipes)
/// - JSON snapshot persistence (see [`crate::snapshot`])
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    targets: DashMap<TargetId, TargetSlot>,
    options: RemoteOptions,
    writes_committed: AtomicU64,
}

impl InMemoryRemote {
    /// Creates an empty backend with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend with the given options.
    pub fn with_options(options: RemoteOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    /// Builder-style [`create_target`](Self::create_target).
    pub fn with_target(self, target: TargetId, vars: EnvVars) -> Self {
        self.create_target(target, vars);
        self
    }

    /// Creates (or resets) a target with the given configuration.
    pub fn create_target(&self, target: TargetId, vars: EnvVars) {
        self.targets.insert(target, TargetSlot::with_vars(vars));
    }

    pub(crate) fn restore(&self, target: TargetId, record: TargetRecord) {
        self.targets.insert(
            target,
            TargetSlot {
                record,
                ..Default::default()
            },
        );
    }

    /// Lists known targets, sorted.
    pub fn targets(&self) -> Vec<TargetId> {
        let mut ids: Vec<TargetId> = self.targets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Current configuration of a target, bypassing failure injection.
    pub fn snapshot(&self, target: &TargetId) -> Option<EnvVars> {
        self.targets.get(target).map(|slot| slot.record.vars.clone())
    }

    /// Current record (configuration and version) of a target.
    pub fn record(&self, target: &TargetId) -> Option<TargetRecord> {
        self.targets.get(target).map(|slot| slot.record.clone())
    }

    /// Number of writes committed across all targets.
    pub fn writes_committed(&self) -> u64 {
        self.writes_committed.load(Ordering::SeqCst)
    }

    /// Replaces a target's configuration as another actor would.
    ///
    /// Returns `false` if the target does not exist.
    pub fn overwrite(&self, target: &TargetId, vars: EnvVars) -> bool {
        match self.targets.get_mut(target) {
            Some(mut slot) => {
                slot.record.vars = vars;
                slot.record.version += 1;
                true
            }
            None => false,
        }
    }

    /// Clears a target's configuration, as a redeploy by its owner does.
    pub fn wipe(&self, target: &TargetId) -> bool {
        self.overwrite(target, EnvVars::new())
    }

    /// Marks the target as having an update in flight for `duration`.
    pub fn begin_external_update(&self, target: &TargetId, duration: Duration) -> bool {
        match self.targets.get_mut(target) {
            Some(mut slot) => {
                slot.busy_until = Some(Instant::now() + duration);
                true
            }
            None => false,
        }
    }

    /// Makes the next `count` writes to `target` fail with `error`.
    ///
    /// Returns `false` if the target does not exist.
    pub fn fail_next_writes(&self, target: &TargetId, count: usize, error: RemoteError) -> bool {
        match self.targets.get_mut(target) {
            Some(mut slot) => {
                slot.failing_writes.extend(std::iter::repeat_n(error, count));
                true
            }
            None => false,
        }
    }

    /// Makes the next `count` fetches of `target` fail with `error`.
    ///
    /// Returns `false` if the target does not exist.
    pub fn fail_next_fetches(&self, target: &TargetId, count: usize, error: RemoteError) -> bool {
        match self.targets.get_mut(target) {
            Some(mut slot) => {
                slot.failing_fetches.extend(std::iter::repeat_n(error, count));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RemoteConfiguration for InMemoryRemote {
    async fn fetch(&self, target: &TargetId) -> Result<EnvVars, RemoteError> {
        let mut slot = self
            .targets
            .get_mut(target)
            .ok_or_else(|| RemoteError::not_found(target.as_str()))?;

        if let Some(error) = slot.failing_fetches.pop_front() {
            debug!(target = %target, error = %error, "Injected fetch failure");
            return Err(error);
        }

        Ok(slot.record.vars.clone())
    }

    async fn write(&self, target: &TargetId, vars: &EnvVars) -> Result<(), RemoteError> {
        let now = Instant::now();

        if !self.targets.contains_key(target) {
            if !self.options.create_missing {
                return Err(RemoteError::not_found(target.as_str()));
            }
            self.targets
                .entry(target.clone())
                .or_insert_with(|| TargetSlot::with_vars(EnvVars::new()));
        }

        let mut slot = self
            .targets
            .get_mut(target)
            .ok_or_else(|| RemoteError::not_found(target.as_str()))?;

        if let Some(error) = slot.failing_writes.pop_front() {
            debug!(target = %target, error = %error, "Injected write failure");
            return Err(error);
        }

        if slot.is_busy(now) {
            return Err(RemoteError::service(
                "ResourceConflictException",
                in_progress_message(target),
            ));
        }

        slot.record.vars = vars.clone();
        slot.record.version += 1;
        if !self.options.update_latency.is_zero() {
            slot.busy_until = Some(now + self.options.update_latency);
        }
        self.writes_committed.fetch_add(1, Ordering::SeqCst);

        debug!(
            target = %target,
            version = slot.record.version,
            keys = slot.record.vars.len(),
            "Committed configuration write"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
