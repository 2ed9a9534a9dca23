#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{ffi::OsString, path::PathBuf};

use anyhow::{Context, Result};
use which::which;

/// Finds and returns the path to the configured version-control program.
pub fn git_path(program: &str) -> Result<OsString> {
    which(program)
        .map(PathBuf::into_os_string)
        .with_context(|| format!("Cannot find {program} on path"))
}

/// Rounds a grade to two decimals for presentation.
pub fn round_grade(grade: f64) -> f64 {
    (grade * 100.0).round() / 100.0
}
