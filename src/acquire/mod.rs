#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Repository acquisition: turning a locator into a local copy.

/// The `git`-backed acquirer.
pub mod git;
/// Repository locator grammar.
pub mod locator;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
pub use git::{GitAcquirer, classify_failure};
pub use locator::{RepoLocator, Transport, parse_locator};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Whether an acquisition produced a local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionStatus {
    /// A local copy exists at `local_path`.
    Success,
    /// No local copy exists.
    Failed,
}

/// Outcome of one acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    /// Absolute path of the copy; present only on success. Owned by the
    /// caller until it is cleaned up, after which it must not be reused.
    pub local_path:  Option<PathBuf>,
    /// Success or failure.
    pub status:      AcquisitionStatus,
    /// Failure category, present only on failure.
    pub error_kind:  Option<ErrorKind>,
    /// Failure description, present only on failure.
    pub error:       Option<String>,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: u64,
}

impl AcquisitionResult {
    /// A successful acquisition at `local_path`.
    pub fn success(local_path: PathBuf, elapsed: Duration) -> Self {
        Self {
            local_path:  Some(local_path),
            status:      AcquisitionStatus::Success,
            error_kind:  None,
            error:       None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// A failed acquisition.
    pub fn failed(kind: ErrorKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            local_path:  None,
            status:      AcquisitionStatus::Failed,
            error_kind:  Some(kind),
            error:       Some(message.into()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Returns true if a local copy was produced.
    pub fn is_success(&self) -> bool {
        self.status == AcquisitionStatus::Success && self.local_path.is_some()
    }
}

/// Produces local copies of remote repositories.
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Copies `repo_locator` into `destination` within `timeout`. Never
    /// leaves a partial directory behind on failure.
    async fn acquire(
        &self,
        repo_locator: &str,
        destination: &Path,
        timeout: Duration,
    ) -> AcquisitionResult;

    /// Removes a local copy. Idempotent; returns false only if the path
    /// still exists afterwards.
    fn cleanup(&self, local_path: &Path) -> bool {
        remove_tree(local_path)
    }
}

/// Recursively removes `path`. Returns true if nothing remains at `path`,
/// including when nothing was there to begin with.
pub fn remove_tree(path: &Path) -> bool {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
        Err(e) => {
            tracing::warn!("Could not inspect {}: {}", path.display(), e);
            return false;
        }
    };

    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match removed {
        Ok(()) => {
            tracing::info!("Cleaned up repository at {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::error!("Error during cleanup of {}: {}", path.display(), e);
            false
        }
    }
}
