//! RecordingRemote - a remote wrapper that captures a call trace.
//!
//! Every fetch and write is delegated to the inner remote and bracketed by
//! started/finished events carrying the tokio clock, so ordering and backoff
//! timing can be checked after the fact.
//!
//! # Example
//!
//! ```ignore
//! use envsync_remote::RecordingRemote;
//!
//! let remote = RecordingRemote::new(memory_remote);
//! executor_over(&remote).execute(&unit).await?;
//!
//! assert_eq!(remote.trace().count(TraceKind::WriteFinished), 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use envsync_core::{EnvVars, TargetId};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{FailureClass, RemoteError};
use crate::traits::RemoteConfiguration;

/// Kind of a traced remote call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    FetchStarted,
    FetchFinished,
    WriteStarted,
    WriteFinished,
}

/// Outcome attached to `*Finished` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceOutcome {
    Ok,
    Conflict,
    Failed,
}

impl TraceOutcome {
    fn of<T>(result: &Result<T, RemoteError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) if e.classify() == FailureClass::Conflict => Self::Conflict,
            Err(_) => Self::Failed,
        }
    }
}

/// One entry in a [`CallTrace`].
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Position in the trace, starting at 0.
    pub seq: usize,
    pub kind: TraceKind,
    pub target: TargetId,
    /// Payload of a write (on `WriteStarted`) or the fetched state (on a
    /// successful `FetchFinished`).
    pub vars: Option<EnvVars>,
    /// Set on `*Finished` events.
    pub outcome: Option<TraceOutcome>,
    /// Tokio clock reading, so paused-time tests observe exact delays.
    pub at: Instant,
}

impl TraceEvent {
    /// Returns `true` if this is a `WriteStarted` whose payload contains `key`.
    pub fn writes_key(&self, key: &str) -> bool {
        self.kind == TraceKind::WriteStarted
            && self.vars.as_ref().is_some_and(|vars| vars.contains_key(key))
    }
}

/// Shared, append-only call trace.
#[derive(Debug, Clone, Default)]
pub struct CallTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl CallTrace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraceEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(
        &self,
        kind: TraceKind,
        target: &TargetId,
        vars: Option<EnvVars>,
        outcome: Option<TraceOutcome>,
    ) {
        let mut events = self.lock();
        let seq = events.len();
        trace!(seq, kind = ?kind, target = %target, outcome = ?outcome, "Recorded remote call");
        events.push(TraceEvent {
            seq,
            kind,
            target: target.clone(),
            vars,
            outcome,
            at: Instant::now(),
        });
    }

    /// Snapshot of every recorded event, in order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().clone()
    }

    /// Events of one kind, in order.
    pub fn of_kind(&self, kind: TraceKind) -> Vec<TraceEvent> {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: TraceKind) -> usize {
        self.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// A remote wrapper that records every call into a [`CallTrace`].
pub struct RecordingRemote<R: RemoteConfiguration> {
    /// The inner remote implementation.
    inner: R,
    /// The trace being appended to.
    trace: CallTrace,
}

impl<R: RemoteConfiguration> RecordingRemote<R> {
    /// Create a new recording wrapper with a fresh trace.
    pub fn new(inner: R) -> Self {
        Self::with_trace(inner, CallTrace::new())
    }

    /// Create a recording wrapper appending to an existing trace.
    pub fn with_trace(inner: R, trace: CallTrace) -> Self {
        Self { inner, trace }
    }

    /// Get a reference to the inner remote.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Get a handle to the trace.
    pub fn trace(&self) -> &CallTrace {
        &self.trace
    }
}

#[async_trait]
impl<R: RemoteConfiguration> RemoteConfiguration for RecordingRemote<R> {
    async fn fetch(&self, target: &TargetId) -> Result<EnvVars, RemoteError> {
        self.trace.push(TraceKind::FetchStarted, target, None, None);
        let result = self.inner.fetch(target).await;
        self.trace.push(
            TraceKind::FetchFinished,
            target,
            result.as_ref().ok().cloned(),
            Some(TraceOutcome::of(&result)),
        );
        result
    }

    async fn write(&self, target: &TargetId, vars: &EnvVars) -> Result<(), RemoteError> {
        self.trace
            .push(TraceKind::WriteStarted, target, Some(vars.clone()), None);
        let result = self.inner.write(target, vars).await;
        self.trace.push(
            TraceKind::WriteFinished,
            target,
            None,
            Some(TraceOutcome::of(&result)),
        );
        result
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<R: RemoteConfiguration> std::fmt::Debug for RecordingRemote<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRemote")
            .field("backend", &self.inner.backend_name())
            .field("events", &self.trace.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote that conflicts on the first write and succeeds afterwards.
    struct FlakyRemote {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteConfiguration for FlakyRemote {
        async fn fetch(&self, _target: &TargetId) -> Result<EnvVars, RemoteError> {
            Ok(EnvVars::from([("A".to_string(), "1".to_string())]))
        }

        async fn write(&self, target: &TargetId, _vars: &EnvVars) -> Result<(), RemoteError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RemoteError::conflict(target.as_str(), "busy"));
            }
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_records_calls_in_order_with_outcomes() {
        let remote = RecordingRemote::new(FlakyRemote {
            writes: AtomicUsize::new(0),
        });
        let target = TargetId::new("fn").unwrap();

        let state = remote.fetch(&target).await.unwrap();
        let mut next = state.clone();
        next.insert("B".to_string(), "2".to_string());
        assert!(remote.write(&target, &next).await.is_err());
        assert!(remote.write(&target, &next).await.is_ok());

        let kinds: Vec<TraceKind> = remote.trace().events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TraceKind::FetchStarted,
                TraceKind::FetchFinished,
                TraceKind::WriteStarted,
                TraceKind::WriteFinished,
                TraceKind::WriteStarted,
                TraceKind::WriteFinished,
            ]
        );

        let finished = remote.trace().of_kind(TraceKind::WriteFinished);
        assert_eq!(finished[0].outcome, Some(TraceOutcome::Conflict));
        assert_eq!(finished[1].outcome, Some(TraceOutcome::Ok));

        let started = remote.trace().of_kind(TraceKind::WriteStarted);
        assert!(started[0].writes_key("B"));
        assert!(!started[0].writes_key("C"));
        assert_eq!(remote.backend_name(), "flaky");
    }

    #[tokio::test]
    async fn test_shared_trace_and_clear() {
        let trace = CallTrace::new();
        let a = RecordingRemote::with_trace(
            FlakyRemote {
                writes: AtomicUsize::new(1),
            },
            trace.clone(),
        );
        let target = TargetId::new("fn").unwrap();
        a.fetch(&target).await.unwrap();

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.count(TraceKind::FetchFinished), 1);
        trace.clear();
        assert!(a.trace().is_empty());
    }
}
