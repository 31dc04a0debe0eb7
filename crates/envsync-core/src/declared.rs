//! Declared configuration snapshots and staleness tokens.
//!
//! A target's declared configuration is every property that, when changed,
//! means the remote resource may have been redeployed and its runtime
//! environment reset: code location, runtime, handler, memory, layers and so
//! on. Managed keys must then be re-applied even though their own key/value
//! did not change.
//!
//! Building a token is two-phase: fields are declared into a
//! [`DeclaredConfiguration`] as they become known, then
//! [`DeclaredConfiguration::staleness_token`] hashes the resolved snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fingerprint of a target's declared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StalenessToken(String);

impl StalenessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StalenessToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StalenessToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StalenessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the configuration-affecting fields of one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclaredConfiguration {
    fields: BTreeMap<String, Value>,
}

impl DeclaredConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from a JSON document.
    ///
    /// Top-level object members become fields. Any other value is stored
    /// under a single `value` field.
    pub fn from_value(value: Value) -> Self {
        let mut declared = Self::new();
        match value {
            Value::Object(map) => {
                for (name, field) in map {
                    declared.fields.insert(name, field);
                }
            }
            Value::Null => {}
            other => {
                declared.fields.insert("value".to_string(), other);
            }
        }
        declared
    }

    /// Declares (or replaces) one field.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Builder-style [`insert`](Self::insert) for any serializable value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        self.fields.insert(name.into(), value);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Computes the staleness token for this snapshot.
    ///
    /// SHA-256 over a canonical JSON rendering with object keys sorted at
    /// every depth, so member order never affects the token. Array order is
    /// significant.
    pub fn staleness_token(&self) -> StalenessToken {
        let mut canonical = String::new();
        canonical.push('{');
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                canonical.push(',');
            }
            write_json_string(name, &mut canonical);
            canonical.push(':');
            write_canonical(value, &mut canonical);
        }
        canonical.push('}');

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let token = StalenessToken(hex::encode(hasher.finalize()));
        tracing::trace!(fields = self.fields.len(), token = %token, "Computed staleness token");
        token
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, member)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(name, out);
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_json_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
