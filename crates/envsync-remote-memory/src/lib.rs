//! In-memory remote configuration backend for envsync.
//!
//! This crate provides an implementation of the `RemoteConfiguration` trait
//! from `envsync-remote`, backed by a `DashMap` of versioned per-target
//! configurations. It models a remote that accepts one in-flight update at a
//! time and supports scripted failures, so the reconciler can be exercised
//! against conflicts without a cloud account.
//!
//! # Example
//!
//! ```ignore
//! use envsync_remote_memory::{InMemoryRemote, RemoteOptions};
//!
//! let remote = InMemoryRemote::with_options(RemoteOptions {
//!     update_latency: Duration::from_secs(2),
//!     ..Default::default()
//! })
//! .with_target(TargetId::new("orders-fn")?, EnvVars::new());
//! ```

pub mod snapshot;
pub mod storage;

pub use envsync_remote::{RemoteConfiguration, RemoteError};
pub use snapshot::SnapshotError;
pub use storage::{InMemoryRemote, RemoteOptions, TargetRecord};

/// Type alias for a shareable in-memory remote.
pub type SharedMemoryRemote = std::sync::Arc<InMemoryRemote>;

/// Creates a new shared in-memory remote.
pub fn create_memory_remote() -> SharedMemoryRemote {
    std::sync::Arc::new(InMemoryRemote::new())
}
