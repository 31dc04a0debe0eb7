//! Reconciliation data model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::declared::StalenessToken;
use crate::error::{CoreError, Result};

/// Live key/value configuration of a remote resource.
///
/// A `BTreeMap` keeps writes and snapshots deterministic.
pub type EnvVars = BTreeMap<String, String>;

/// Opaque handle to a remote resource (e.g. a deployed function name or ARN).
///
/// Deserialization goes through [`TargetId::new`], so stored ids are
/// validated the same way as constructed ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId(String);

impl TargetId {
    /// Creates a target id, rejecting empty handles.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::invalid_target("target id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TargetId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a unit does to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Set the key to the value, overwriting any previous value.
    Apply,
    /// Remove the key if present.
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Lifecycle event delivered by the framework that owns the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Create,
    Update,
    Delete,
}

impl LifecycleEvent {
    /// Create and Update apply the key; Delete removes it.
    pub fn operation(self) -> Operation {
        match self {
            Self::Create | Self::Update => Operation::Apply,
            Self::Delete => Operation::Remove,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// One (key, value, operation) piece of work against one remote resource.
///
/// The key is fixed at construction. A different key is a different unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationUnit {
    target_id: TargetId,
    key: String,
    value: String,
    operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    staleness_token: Option<StalenessToken>,
}

impl ReconciliationUnit {
    /// Creates a unit. The key must be non-empty; the value may be empty.
    pub fn new(
        target_id: TargetId,
        key: impl Into<String>,
        value: impl Into<String>,
        operation: Operation,
    ) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            target_id,
            key,
            value: value.into(),
            operation,
            staleness_token: None,
        })
    }

    pub fn apply(target_id: TargetId, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(target_id, key, value, Operation::Apply)
    }

    pub fn remove(target_id: TargetId, key: impl Into<String>) -> Result<Self> {
        Self::new(target_id, key, String::new(), Operation::Remove)
    }

    pub fn with_staleness_token(mut self, token: StalenessToken) -> Self {
        self.staleness_token = Some(token);
        self
    }

    /// Same unit identity, driven by a different lifecycle event.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn staleness_token(&self) -> Option<&StalenessToken> {
        self.staleness_token.as_ref()
    }
}

/// Keys must be non-empty.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CoreError::invalid_key("key must not be empty"));
    }
    Ok(())
}
