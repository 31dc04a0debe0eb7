//! ChainRunner - drives execution chains to completion.
//!
//! Units of one chain run strictly one after another; a unit starts only
//! once its predecessor has reached a terminal state. A failed unit does not
//! stop its successors, since they depend on completion, not success.
//! Chains for different targets run concurrently.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use envsync_core::{Operation, ReconciliationUnit, TargetId};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::chain::ExecutionChain;
use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::ledger::ReconcileLedger;
use crate::registry::ExecutorHandle;

/// Lifecycle of a unit within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Pending,
    Executing,
    Succeeded,
    Failed,
    Skipped,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Executing => write!(f, "executing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one unit.
#[derive(Debug)]
pub struct UnitReport {
    pub key: String,
    pub operation: Operation,
    pub state: UnitState,
    pub attempts: u32,
    pub physical_id: Option<String>,
    pub error: Option<ReconcileError>,
}

impl UnitReport {
    fn new(unit: &ReconciliationUnit, state: UnitState) -> Self {
        Self {
            key: unit.key().to_string(),
            operation: unit.operation(),
            state,
            attempts: 0,
            physical_id: None,
            error: None,
        }
    }
}

/// Result of running one chain.
#[derive(Debug)]
pub struct ChainReport {
    pub target_id: TargetId,
    pub units: Vec<UnitReport>,
}

impl ChainReport {
    /// A report for `chain` with every unit still queued.
    pub fn pending(chain: &ExecutionChain) -> Self {
        Self {
            target_id: chain.target_id().clone(),
            units: chain
                .iter()
                .map(|unit| UnitReport::new(unit, UnitState::Pending))
                .collect(),
        }
    }

    pub fn count(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state == state).count()
    }

    pub fn is_success(&self) -> bool {
        self.count(UnitState::Failed) == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &ReconcileError> {
        self.units.iter().filter_map(|u| u.error.as_ref())
    }
}

/// Result of a full reconciliation pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// One report per target, sorted by target.
    pub chains: Vec<ChainReport>,
    /// Failures that prevented a chain from reporting at all.
    pub errors: Vec<ReconcileError>,
}

impl PassReport {
    pub fn count(&self, state: UnitState) -> usize {
        self.chains.iter().map(|c| c.count(state)).sum()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.chains.iter().all(ChainReport::is_success)
    }

    pub fn failures(&self) -> Vec<&ReconcileError> {
        self.chains
            .iter()
            .flat_map(ChainReport::errors)
            .chain(self.errors.iter())
            .collect()
    }

    pub fn chain(&self, target: &TargetId) -> Option<&ChainReport> {
        self.chains.iter().find(|c| &c.target_id == target)
    }
}

/// Runs chains through one executor and records successes in a ledger.
#[derive(Debug, Clone)]
pub struct ChainRunner {
    executor: ExecutorHandle,
    ledger: Arc<ReconcileLedger>,
    force: bool,
    unit_timeout: Option<Duration>,
}

impl ChainRunner {
    pub fn new(executor: ExecutorHandle, ledger: Arc<ReconcileLedger>, config: &ReconcileConfig) -> Self {
        Self {
            executor,
            ledger,
            force: config.force,
            unit_timeout: config.unit_timeout(),
        }
    }

    pub fn ledger(&self) -> &Arc<ReconcileLedger> {
        &self.ledger
    }

    /// Runs every unit of `chain` in order.
    pub async fn run_chain(&self, chain: &ExecutionChain) -> ChainReport {
        let mut report = ChainReport::pending(chain);

        for (index, unit) in chain.iter().enumerate() {
            if let Some(before) = chain.predecessor_index(index) {
                debug_assert!(report.units[before].state.is_terminal());
            }

            if !self.force && self.ledger.is_current(unit) {
                debug!(target = %unit.target_id(), key = unit.key(), "Unit already current, skipping");
                report.units[index].state = UnitState::Skipped;
                continue;
            }

            let slot = &mut report.units[index];
            slot.state = UnitState::Executing;
            match self.executor.execute_with_timeout(unit, self.unit_timeout).await {
                Ok(outcome) => {
                    self.ledger.record_success(unit);
                    slot.state = UnitState::Succeeded;
                    slot.attempts = outcome.attempts;
                    slot.physical_id = Some(outcome.physical_id);
                }
                Err(e) => {
                    error!(
                        target = %unit.target_id(),
                        key = unit.key(),
                        category = %e.category(),
                        error = %e,
                        "Reconciliation unit failed"
                    );
                    slot.state = UnitState::Failed;
                    slot.attempts = e.attempts().unwrap_or(0);
                    slot.error = Some(e);
                }
            }
        }

        info!(
            target = %report.target_id,
            succeeded = report.count(UnitState::Succeeded),
            skipped = report.count(UnitState::Skipped),
            failed = report.count(UnitState::Failed),
            "Chain finished"
        );
        report
    }

    /// Runs a set of chains, concurrently across targets.
    ///
    /// Chains for the same target are joined in the order given so their
    /// units still execute one at a time.
    pub async fn run_pass(&self, chains: Vec<ExecutionChain>) -> PassReport {
        let mut pass = PassReport::default();
        let mut by_target: BTreeMap<TargetId, ExecutionChain> = BTreeMap::new();

        for chain in chains {
            match by_target.entry(chain.target_id().clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(chain);
                }
                Entry::Occupied(mut slot) => {
                    if let Err(e) = slot.get_mut().append(chain) {
                        pass.errors.push(e.into());
                    }
                }
            }
        }

        let mut unfinished: BTreeMap<TargetId, ChainReport> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        for (target, chain) in by_target {
            unfinished.insert(target, ChainReport::pending(&chain));
            let runner = self.clone();
            tasks.spawn(async move { runner.run_chain(&chain).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    unfinished.remove(&report.target_id);
                    pass.chains.push(report);
                }
                Err(e) => error!(error = %e, "Chain task failed"),
            }
        }

        // Units of a chain whose task died never ran; report them as pending.
        for (target, report) in unfinished {
            pass.errors.push(ReconcileError::Chain {
                target: target.to_string(),
                message: "chain task panicked or was cancelled".to_string(),
            });
            pass.chains.push(report);
        }

        pass.chains.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainScheduler;
    use crate::executor::ReconcileExecutor;
    use envsync_core::{DeclaredConfiguration, EnvVars};
    use envsync_remote::RemoteError;
    use envsync_remote_memory::InMemoryRemote;
    use serde_json::json;

    fn target(id: &str) -> TargetId {
        TargetId::new(id).unwrap()
    }

    fn setup(targets: &[&str], config: &ReconcileConfig) -> (Arc<InMemoryRemote>, ChainRunner) {
        let mut remote = InMemoryRemote::new();
        for id in targets {
            remote = remote.with_target(target(id), EnvVars::new());
        }
        let remote = Arc::new(remote);
        let executor = Arc::new(ReconcileExecutor::new(remote.clone(), config.retry.clone()));
        let runner = ChainRunner::new(executor, Arc::new(ReconcileLedger::new()), config);
        (remote, runner)
    }

    fn chain(id: &str, pairs: &[(&str, &str)]) -> ExecutionChain {
        let declared = DeclaredConfiguration::from_value(json!({"FunctionName": id}));
        ChainScheduler::new(target(id), declared)
            .build_chain(pairs.iter().copied(), Operation::Apply)
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_run_skips_current_units() {
        let (remote, runner) = setup(&["F"], &ReconcileConfig::for_testing());
        let chain = chain("F", &[("X", "1"), ("Y", "2")]);

        let first = runner.run_chain(&chain).await;
        assert_eq!(first.count(UnitState::Succeeded), 2);

        let second = runner.run_chain(&chain).await;
        assert_eq!(second.count(UnitState::Skipped), 2);
        assert_eq!(remote.writes_committed(), 2);
    }

    #[tokio::test]
    async fn test_force_reapplies_current_units() {
        let config = ReconcileConfig {
            force: true,
            ..ReconcileConfig::for_testing()
        };
        let (remote, runner) = setup(&["F"], &config);
        let chain = chain("F", &[("X", "1")]);

        runner.run_chain(&chain).await;
        remote.wipe(&target("F"));
        let report = runner.run_chain(&chain).await;

        assert_eq!(report.count(UnitState::Succeeded), 1);
        assert_eq!(remote.snapshot(&target("F")).unwrap().get("X").map(String::as_str), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_unit_does_not_stop_successors() {
        let (remote, runner) = setup(&["F"], &ReconcileConfig::for_testing());
        remote.fail_next_writes(&target("F"), 1, RemoteError::access_denied("F", "denied"));

        let report = runner.run_chain(&chain("F", &[("X", "1"), ("Y", "2")])).await;

        assert_eq!(report.units[0].state, UnitState::Failed);
        assert_eq!(report.units[1].state, UnitState::Succeeded);
        assert!(!report.is_success());
        assert_eq!(report.errors().count(), 1);
        assert!(runner.ledger().get(&target("F"), "X").is_none());
    }

    #[tokio::test]
    async fn test_pass_covers_every_target() {
        let (remote, runner) = setup(&["F", "G"], &ReconcileConfig::for_testing());

        let pass = runner
            .run_pass(vec![chain("G", &[("B", "2")]), chain("F", &[("A", "1")])])
            .await;

        assert!(pass.is_success());
        let targets: Vec<&str> = pass.chains.iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(targets, vec!["F", "G"]);
        assert_eq!(remote.snapshot(&target("G")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pass_joins_chains_for_same_target() {
        let (remote, runner) = setup(&["F"], &ReconcileConfig::for_testing());

        let pass = runner
            .run_pass(vec![chain("F", &[("A", "1")]), chain("F", &[("B", "2")])])
            .await;

        assert_eq!(pass.chains.len(), 1);
        assert_eq!(pass.count(UnitState::Succeeded), 2);
        assert_eq!(remote.snapshot(&target("F")).unwrap().len(), 2);
    }

    struct PanickingRemote;

    #[async_trait::async_trait]
    impl envsync_remote::RemoteConfiguration for PanickingRemote {
        async fn fetch(&self, _target: &TargetId) -> Result<EnvVars, RemoteError> {
            panic!("remote client crashed");
        }

        async fn write(&self, _target: &TargetId, _vars: &EnvVars) -> Result<(), RemoteError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "panicking"
        }
    }

    #[test]
    fn test_pending_report_lists_every_unit() {
        let report = ChainReport::pending(&chain("F", &[("X", "1"), ("Y", "2")]));
        assert_eq!(report.count(UnitState::Pending), 2);
        assert!(report.is_success());
        let keys: Vec<&str> = report.units.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["X", "Y"]);
    }

    #[tokio::test]
    async fn test_completed_chain_leaves_no_pending_units() {
        let (_remote, runner) = setup(&["F"], &ReconcileConfig::for_testing());
        let report = runner.run_chain(&chain("F", &[("X", "1"), ("Y", "2")])).await;
        assert_eq!(report.count(UnitState::Pending), 0);
        assert!(report.units.iter().all(|u| u.state.is_terminal()));
    }

    #[tokio::test]
    async fn test_crashed_chain_reports_units_as_pending() {
        let config = ReconcileConfig::for_testing();
        let executor = Arc::new(ReconcileExecutor::new(Arc::new(PanickingRemote), config.retry.clone()));
        let runner = ChainRunner::new(executor, Arc::new(ReconcileLedger::new()), &config);

        let pass = runner.run_pass(vec![chain("F", &[("X", "1"), ("Y", "2")])]).await;

        assert!(!pass.is_success());
        assert_eq!(pass.errors.len(), 1);
        assert_eq!(pass.count(UnitState::Pending), 2);
        assert_eq!(pass.chain(&target("F")).map(|c| c.units.len()), Some(2));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!UnitState::Pending.is_terminal());
        assert!(!UnitState::Executing.is_terminal());
        assert!(UnitState::Skipped.is_terminal());
        assert_eq!(UnitState::Failed.to_string(), "failed");
    }
}
