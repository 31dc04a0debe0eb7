//! Reconciliation engine for envsync.
//!
//! Applies per-key environment variable changes to remote configurations
//! that only support whole-map writes. Each unit is a fetch, merge and full
//! write, retried with bounded backoff when another update is in flight.
//! Units for one target are chained so they never race each other.
//!
//! # Example
//!
//! ```ignore
//! use envsync_reconcile::{ChainRunner, ChainScheduler, ReconcileConfig};
//!
//! let scheduler = ChainScheduler::new(target, declared);
//! let chain = scheduler.build_chain([("X", "1"), ("Y", "2")], Operation::Apply)?;
//! let report = runner.run_chain(&chain).await;
//! assert!(report.is_success());
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod lifecycle;
pub mod plan;
pub mod registry;
pub mod retry;
pub mod runner;

pub use chain::{ChainScheduler, ExecutionChain};
pub use config::ReconcileConfig;
pub use error::{ErrorCategory, ReconcileError};
pub use executor::{ReconcileExecutor, ReconcileOutcome};
pub use ledger::{LedgerEntry, LedgerError, ReconcileLedger};
pub use lifecycle::{
    LifecycleHandler, LifecycleRequest, LifecycleResponse, ResponseData, ResponseStatus,
    UnitProperties,
};
pub use plan::{DesiredTarget, plan_pass};
pub use registry::{ExecutorHandle, ExecutorRegistry};
pub use retry::{RetryPolicy, RetryState};
pub use runner::{ChainReport, ChainRunner, PassReport, UnitReport, UnitState};

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
