//! # envsync-remote
//!
//! The remote configuration capability consumed by the reconciler.
//!
//! This crate defines the [`RemoteConfiguration`] trait that backends
//! implement, the [`RemoteError`] taxonomy with its single point of failure
//! classification, and [`RecordingRemote`], a decorator that captures a call
//! trace. Backends live in separate crates.
//!
//! ## Implementing a backend
//!
//! ```ignore
//! use async_trait::async_trait;
//! use envsync_remote::{RemoteConfiguration, RemoteError};
//!
//! struct FunctionConfigApi { /* ... */ }
//!
//! #[async_trait]
//! impl RemoteConfiguration for FunctionConfigApi {
//!     async fn fetch(&self, target: &TargetId) -> Result<EnvVars, RemoteError> {
//!         // GetFunctionConfiguration
//!     }
//!     async fn write(&self, target: &TargetId, vars: &EnvVars) -> Result<(), RemoteError> {
//!         // UpdateFunctionConfiguration; map ResourceConflictException
//!         // to RemoteError::service("ResourceConflictException", ..)
//!     }
//!     fn backend_name(&self) -> &'static str { "function-config" }
//! }
//! ```

mod error;
pub mod recording;
mod traits;

pub use error::{ErrorCategory, FailureClass, RemoteError};
pub use recording::{CallTrace, RecordingRemote, TraceEvent, TraceKind, TraceOutcome};
pub use traits::RemoteConfiguration;

/// Type alias for a remote result.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Type alias for a shared remote trait object.
pub type DynRemote = std::sync::Arc<dyn RemoteConfiguration>;
