//! Per-target execution chains.
//!
//! Units touching the same target share one read-modify-write cycle on the
//! remote, so they are linked into a total order: each unit depends on the
//! completion of the one before it. Building a chain happens in two phases:
//! a [`ChainScheduler`] is created for a target first, its declared
//! configuration is filled in as values become known, and only then is the
//! chain itself built. That keeps the staleness token from being computed
//! before the fields it covers are resolved.

use std::collections::BTreeSet;

use envsync_core::{
    CoreError, DeclaredConfiguration, Operation, ReconciliationUnit, StalenessToken, TargetId,
};
use serde::Serialize;
use tracing::debug;

/// Builds execution chains for one target.
#[derive(Debug, Clone)]
pub struct ChainScheduler {
    target_id: TargetId,
    declared: DeclaredConfiguration,
}

impl ChainScheduler {
    pub fn new(target_id: TargetId, declared: DeclaredConfiguration) -> Self {
        Self { target_id, declared }
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn declared(&self) -> &DeclaredConfiguration {
        &self.declared
    }

    /// Declared fields that are only known after the scheduler exists.
    pub fn declared_mut(&mut self) -> &mut DeclaredConfiguration {
        &mut self.declared
    }

    /// Builds a chain with one unit per `(key, value)` pair, in input order.
    ///
    /// Every unit carries the staleness token of the declared configuration.
    /// Keys must be non-empty and unique within the chain.
    pub fn build_chain<I, K, V>(&self, desired: I, operation: Operation) -> Result<ExecutionChain, CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let token = self.declared.staleness_token();
        let mut seen = BTreeSet::new();
        let mut units = Vec::new();

        for (key, value) in desired {
            let key = key.into();
            if !seen.insert(key.clone()) {
                return Err(CoreError::duplicate_key(self.target_id.as_str(), key));
            }
            let unit = ReconciliationUnit::new(self.target_id.clone(), key, value, operation)?
                .with_staleness_token(token.clone());
            units.push(unit);
        }

        debug!(
            target = %self.target_id,
            operation = %operation,
            units = units.len(),
            token = %token,
            "Built execution chain"
        );

        Ok(ExecutionChain::linear(self.target_id.clone(), token, units))
    }
}

/// Ordered units for one target with their completion dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionChain {
    target_id: TargetId,
    staleness_token: StalenessToken,
    units: Vec<ReconciliationUnit>,
    /// `predecessors[i]` is the unit that must complete before unit `i` starts.
    predecessors: Vec<Option<usize>>,
}

impl ExecutionChain {
    fn linear(target_id: TargetId, staleness_token: StalenessToken, units: Vec<ReconciliationUnit>) -> Self {
        let predecessors = (0..units.len()).map(|i| i.checked_sub(1)).collect();
        Self {
            target_id,
            staleness_token,
            units,
            predecessors,
        }
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn staleness_token(&self) -> &StalenessToken {
        &self.staleness_token
    }

    pub fn units(&self) -> &[ReconciliationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconciliationUnit> {
        self.units.iter()
    }

    pub fn predecessor_index(&self, index: usize) -> Option<usize> {
        self.predecessors.get(index).copied().flatten()
    }

    pub fn predecessor(&self, index: usize) -> Option<&ReconciliationUnit> {
        self.predecessor_index(index).and_then(|p| self.units.get(p))
    }

    /// Dependency edges as `(before, after)` pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.predecessors
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (p, i)))
            .collect()
    }

    /// Appends `other` so that its first unit waits for this chain's last.
    ///
    /// Both chains must target the same resource. Units keep their own
    /// staleness tokens.
    pub fn append(&mut self, other: ExecutionChain) -> Result<(), CoreError> {
        if other.target_id != self.target_id {
            return Err(CoreError::invalid_target(format!(
                "cannot append chain for {} to chain for {}",
                other.target_id, self.target_id
            )));
        }
        let offset = self.units.len();
        for (i, unit) in other.units.into_iter().enumerate() {
            self.predecessors.push((offset + i).checked_sub(1));
            self.units.push(unit);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ExecutionChain {
    type Item = &'a ReconciliationUnit;
    type IntoIter = std::slice::Iter<'a, ReconciliationUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}
