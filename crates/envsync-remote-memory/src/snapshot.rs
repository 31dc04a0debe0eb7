//! JSON snapshot persistence for [`InMemoryRemote`].
//!
//! Lets a local state file stand in for a real remote across process runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use envsync_core::TargetId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::storage::{InMemoryRemote, RemoteOptions, TargetRecord};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    format_version: u32,
    targets: BTreeMap<TargetId, TargetRecord>,
}

impl InMemoryRemote {
    /// Serializes every target to pretty JSON.
    pub fn to_snapshot_json(&self) -> Result<String, SnapshotError> {
        let targets = self
            .targets()
            .into_iter()
            .filter_map(|id| self.record(&id).map(|record| (id, record)))
            .collect();
        let document = SnapshotDocument {
            format_version: SNAPSHOT_FORMAT_VERSION,
            targets,
        };
        let mut payload = serde_json::to_string_pretty(&document)?;
        payload.push('\n');
        Ok(payload)
    }

    /// Builds a backend from JSON produced by [`to_snapshot_json`](Self::to_snapshot_json).
    pub fn from_snapshot_json(raw: &str, options: RemoteOptions) -> Result<Self, SnapshotError> {
        let document: SnapshotDocument = serde_json::from_str(raw)?;
        if document.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: document.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let remote = Self::with_options(options);
        for (id, record) in document.targets {
            remote.restore(id, record);
        }
        Ok(remote)
    }

    /// Writes the snapshot to `path`.
    ///
    /// The payload goes to a sibling `.tmp` file first and is renamed over
    /// `path`, so an interrupted save leaves the previous snapshot intact.
    pub async fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        let payload = self.to_snapshot_json()?;
        let io_error = |source: std::io::Error| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        };
        let staging = staging_path(path);
        tokio::fs::write(&staging, payload).await.map_err(io_error)?;
        tokio::fs::rename(&staging, path).await.map_err(io_error)?;
        debug!(path = %path.display(), targets = self.targets().len(), "Saved remote snapshot");
        Ok(())
    }

    /// Loads a snapshot from `path`; a missing file yields an empty backend.
    pub async fn load_snapshot(path: &Path, options: RemoteOptions) -> Result<Self, SnapshotError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_snapshot_json(&raw, options),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::with_options(options)),
            Err(source) => Err(SnapshotError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}
