//! Turns a declaration into the chains one pass must run.

use std::collections::BTreeSet;

use envsync_core::{CoreError, DeclaredConfiguration, Operation, TargetId};

use crate::chain::{ChainScheduler, ExecutionChain};
use crate::ledger::ReconcileLedger;

/// Variables declared for one target.
#[derive(Debug, Clone)]
pub struct DesiredTarget {
    pub target_id: TargetId,
    pub declared: DeclaredConfiguration,
    /// `(key, value)` pairs in declaration order.
    pub variables: Vec<(String, String)>,
}

impl DesiredTarget {
    pub fn new(target_id: TargetId, declared: DeclaredConfiguration) -> Self {
        Self {
            target_id,
            declared,
            variables: Vec::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((key.into(), value.into()));
        self
    }
}

/// Plans one reconciliation pass.
///
/// Every declared target gets an Apply chain for its variables. Keys the
/// ledger recorded for a target that are no longer declared get a Remove
/// chain, which includes every key of targets dropped from the declaration
/// altogether.
pub fn plan_pass(desired: &[DesiredTarget], ledger: &ReconcileLedger) -> Result<Vec<ExecutionChain>, CoreError> {
    let mut chains = Vec::new();
    let mut declared_targets = BTreeSet::new();

    for target in desired {
        if !declared_targets.insert(target.target_id.clone()) {
            return Err(CoreError::invalid_target(format!(
                "{} is declared more than once",
                target.target_id
            )));
        }

        let scheduler = ChainScheduler::new(target.target_id.clone(), target.declared.clone());
        let applies = target
            .variables
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()));
        chains.push(scheduler.build_chain(applies, Operation::Apply)?);

        let wanted: BTreeSet<&str> = target.variables.iter().map(|(key, _)| key.as_str()).collect();
        let stale: Vec<(String, String)> = ledger
            .keys_for(&target.target_id)
            .into_iter()
            .filter(|key| !wanted.contains(key.as_str()))
            .map(|key| (key, String::new()))
            .collect();
        if !stale.is_empty() {
            chains.push(scheduler.build_chain(stale, Operation::Remove)?);
        }
    }

    for target in ledger.targets() {
        if declared_targets.contains(&target) {
            continue;
        }
        let keys = ledger
            .keys_for(&target)
            .into_iter()
            .map(|key| (key, String::new()));
        let scheduler = ChainScheduler::new(target, DeclaredConfiguration::new());
        chains.push(scheduler.build_chain(keys, Operation::Remove)?);
    }

    Ok(chains)
}
