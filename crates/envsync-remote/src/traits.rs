//! Remote configuration capability.

use std::sync::Arc;

use async_trait::async_trait;
use envsync_core::{EnvVars, TargetId};

use crate::error::RemoteError;

/// Read/write access to the live key/value configuration of remote resources.
///
/// Implementations must be thread-safe (`Send + Sync`). The executor never
/// caches what `fetch` returns; every attempt calls it again.
///
/// # Example
///
/// ```ignore
/// use envsync_remote::{RemoteConfiguration, RemoteError};
///
/// async fn read_key(
///     remote: &dyn RemoteConfiguration,
///     target: &TargetId,
///     key: &str,
/// ) -> Result<Option<String>, RemoteError> {
///     Ok(remote.fetch(target).await?.get(key).cloned())
/// }
/// ```
#[async_trait]
pub trait RemoteConfiguration: Send + Sync {
    /// Returns the configuration as of the most recently committed write.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the target does not exist.
    async fn fetch(&self, target: &TargetId) -> Result<EnvVars, RemoteError>;

    /// Replaces the whole configuration of `target` with `vars`.
    ///
    /// The write is atomic: the full mapping is accepted or rejected.
    ///
    /// # Errors
    ///
    /// Returns an error classified as a conflict (see
    /// [`RemoteError::classify`]) when another update is in flight, and any
    /// other `RemoteError` for failures that must not be retried.
    async fn write(&self, target: &TargetId, vars: &EnvVars) -> Result<(), RemoteError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: RemoteConfiguration + ?Sized> RemoteConfiguration for Arc<T> {
    async fn fetch(&self, target: &TargetId) -> Result<EnvVars, RemoteError> {
        (**self).fetch(target).await
    }

    async fn write(&self, target: &TargetId, vars: &EnvVars) -> Result<(), RemoteError> {
        (**self).write(target, vars).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
