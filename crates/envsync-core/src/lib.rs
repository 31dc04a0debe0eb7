//! Core types for envsync.
//!
//! - [`types`]: targets, operations, lifecycle events and reconciliation units
//! - [`merger`]: the single-key read-merge-write state transition
//! - [`declared`]: declared configuration snapshots and staleness tokens

pub mod declared;
pub mod error;
pub mod merger;
pub mod types;

pub use declared::{DeclaredConfiguration, StalenessToken};
pub use error::{CoreError, ErrorCategory, Result};
pub use merger::{merge, merge_in_place};
pub use types::{EnvVars, LifecycleEvent, Operation, ReconciliationUnit, TargetId, validate_key};
