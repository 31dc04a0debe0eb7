//! ReconcileLedger - what each (target, key) was last reconciled to.
//!
//! The ledger lets a pass skip units whose value and staleness token are
//! already applied, and tells it which keys a previous pass owned so that
//! keys dropped from the declaration can be removed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use envsync_core::{Operation, ReconciliationUnit, StalenessToken, TargetId, validate_key};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last reconciled state of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_token: Option<StalenessToken>,
}

type LedgerDocument = BTreeMap<TargetId, BTreeMap<String, LedgerEntry>>;

/// Thread-safe record of applied units.
#[derive(Debug, Default)]
pub struct ReconcileLedger {
    entries: DashMap<(TargetId, String), LedgerEntry>,
}

impl ReconcileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &TargetId, key: &str) -> Option<LedgerEntry> {
        self.entries
            .get(&(target.clone(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Whether `unit` would change nothing the ledger does not already record.
    ///
    /// Only Apply units can be current. Removal always runs.
    pub fn is_current(&self, unit: &ReconciliationUnit) -> bool {
        if unit.operation() != Operation::Apply {
            return false;
        }
        self.get(unit.target_id(), unit.key())
            .is_some_and(|entry| {
                entry.value == unit.value() && entry.staleness_token.as_ref() == unit.staleness_token()
            })
    }

    /// Records a successfully executed unit.
    pub fn record_success(&self, unit: &ReconciliationUnit) {
        let id = (unit.target_id().clone(), unit.key().to_string());
        match unit.operation() {
            Operation::Apply => {
                self.entries.insert(
                    id,
                    LedgerEntry {
                        value: unit.value().to_string(),
                        staleness_token: unit.staleness_token().cloned(),
                    },
                );
            }
            Operation::Remove => {
                self.entries.remove(&id);
            }
        }
    }

    /// Keys recorded for `target`, sorted.
    pub fn keys_for(&self, target: &TargetId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().0 == target)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Targets with at least one recorded key, sorted.
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self.entries.iter().map(|entry| entry.key().0.clone()).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut document = LedgerDocument::new();
        for entry in self.entries.iter() {
            let (target, key) = entry.key();
            document
                .entry(target.clone())
                .or_default()
                .insert(key.clone(), entry.value().clone());
        }
        let mut payload = serde_json::to_string_pretty(&document)?;
        payload.push('\n');
        Ok(payload)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let document: LedgerDocument = serde_json::from_str(raw)?;
        let ledger = Self::new();
        for (target, keys) in document {
            for (key, entry) in keys {
                validate_key(&key).map_err(<serde_json::Error as serde::de::Error>::custom)?;
                ledger.entries.insert((target.clone(), key), entry);
            }
        }
        Ok(ledger)
    }

    /// Loads the ledger at `path`; a missing file yields an empty ledger.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Self::from_json(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(LedgerError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Writes the ledger to `path`, replacing any previous file only once
    /// the new content is fully on disk.
    pub async fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_error = |source: std::io::Error| LedgerError::Io {
            path: path.display().to_string(),
            source,
        };
        let staging = staging_path(path);
        tokio::fs::write(&staging, self.to_json()?)
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&staging, path).await.map_err(io_error)?;
        debug!(path = %path.display(), entries = self.len(), "Saved reconcile ledger");
        Ok(())
    }
}

/// Sibling file a save writes to before it is renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Errors reading or writing a persisted ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger format error: {0}")]
    Format(#[from] serde_json::Error),
}
