#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a per-submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The repository locator is not a recognized shape.
    InvalidInput,
    /// The remote repository does not exist.
    NotFound,
    /// The repository is private or needs credentials.
    AccessDenied,
    /// The remote could not be reached.
    NetworkError,
    /// Acquisition exceeded its time budget.
    Timeout,
    /// The acquired copy could not be analyzed.
    AnalysisError,
    /// Anything else.
    Unexpected,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::AnalysisError => "AnalysisError",
            ErrorKind::Unexpected => "Unexpected",
        };
        write!(f, "{name}")
    }
}

/// Errors raised while analyzing a local repository copy.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The root path does not exist.
    #[error("Repository path does not exist: {0}")]
    MissingRoot(PathBuf),

    /// The root path exists but is not a directory.
    #[error("Repository path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A file or directory under the root could not be read.
    #[error("Could not read {path}: {source}")]
    Unreadable {
        /// Offending path.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl AnalysisError {
    /// Per-submission category for this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AnalysisError
    }
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_workers` must be at least one.
    #[error("max_workers must be greater than zero")]
    NoWorkers,

    /// The acquisition timeout must be positive.
    #[error("acquisition timeout must be greater than zero")]
    ZeroTimeout,

    /// The source-file extension must not be empty.
    #[error("source file extension must not be empty")]
    EmptyExtension,

    /// The comment marker must not be empty.
    #[error("comment marker must not be empty")]
    EmptyCommentMarker,

    /// An exclude pattern is not a valid glob.
    #[error("invalid exclude pattern `{pattern}`: {message}")]
    BadPattern {
        /// The pattern as configured.
        pattern: String,
        /// Why the glob compiler rejected it.
        message: String,
    },
}

/// Batch-level failures that abort a whole `process` call before any work is
/// dispatched.
#[derive(Error, Debug)]
pub enum GradingError {
    /// The configuration did not validate.
    #[error("invalid grading configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Two ready submissions share an id.
    #[error("duplicate submission id `{0}` in batch")]
    DuplicateSubmission(String),

    /// The scratch area for repository copies is unusable.
    #[error("could not prepare scratch directory {path}: {source}")]
    Scratch {
        /// Scratch root that was requested.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
