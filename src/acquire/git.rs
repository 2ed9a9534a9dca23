#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Shallow clones through an external `git` process.

use std::{
    ffi::OsString,
    path::Path,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{AcquisitionResult, Acquirer, locator::parse_locator, remove_tree};
use crate::{
    config::{GradingConfig, default_clone_args},
    error::ErrorKind,
    process::{self, RunOutcome},
};

/// Maps clone stderr onto an error category and a readable message.
/// Checks run in priority order: access, missing repository, network.
pub fn classify_failure(stderr: &str) -> (ErrorKind, String) {
    let lower = stderr.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&[
        "authentication failed",
        "access denied",
        "permission denied",
        "could not read username",
        "terminal prompts disabled",
    ]) {
        (
            ErrorKind::AccessDenied,
            "Access denied (private repository or authentication required)".to_string(),
        )
    } else if has(&["not found", "does not exist"]) {
        (ErrorKind::NotFound, "Repository not found".to_string())
    } else if has(&[
        "network",
        "connection",
        "could not resolve host",
        "timed out",
        "unable to access",
    ]) {
        (ErrorKind::NetworkError, format!("Network error: {}", stderr.trim()))
    } else if stderr.trim().is_empty() {
        (ErrorKind::Unexpected, "Clone failed without diagnostics".to_string())
    } else {
        (ErrorKind::Unexpected, stderr.trim().to_string())
    }
}

/// Formats a timeout as whole seconds when possible.
fn format_secs(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        timeout.as_secs().to_string()
    } else {
        format!("{}", timeout.as_secs_f64())
    }
}

/// Acquirer that runs `<program> clone <args> <url> <destination>`.
#[derive(Debug, Clone)]
pub struct GitAcquirer {
    /// Version-control program, `git` unless overridden.
    program:    String,
    /// Arguments placed between `clone` and the URL.
    clone_args: Vec<String>,
}

impl Default for GitAcquirer {
    fn default() -> Self {
        Self::new("git", default_clone_args())
    }
}

impl GitAcquirer {
    /// Creates an acquirer for a specific program and clone arguments.
    pub fn new(program: impl Into<String>, clone_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            clone_args,
        }
    }

    /// Creates an acquirer from the batch configuration.
    pub fn from_config(config: &GradingConfig) -> Self {
        Self::new(config.git_program(), config.clone_args().to_vec())
    }

    /// Removes whatever a failed attempt left at `destination`. A directory
    /// this call created goes entirely; a pre-existing empty directory keeps
    /// itself and loses only its new contents.
    async fn discard_partial(destination: &Path, created: bool) {
        let target = destination.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || {
            if created {
                return remove_tree(&target);
            }
            match std::fs::read_dir(&target) {
                Ok(entries) => entries
                    .filter_map(Result::ok)
                    .map(|entry| remove_tree(&entry.path()))
                    .fold(true, |all, ok| all && ok),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false);

        if !removed {
            tracing::warn!("Partial clone left at {}", destination.display());
        }
    }

    /// Ensures the parent of `destination` exists and that `destination` is
    /// either absent or an empty directory. Returns whether the clone will
    /// create `destination`. Anything already at a non-empty destination is
    /// left untouched.
    async fn prepare_destination(destination: &Path) -> Result<bool, (ErrorKind, String)> {
        let unexpected =
            |e: std::io::Error| (ErrorKind::Unexpected, format!("Unexpected error: {e}"));

        match tokio::fs::symlink_metadata(destination).await {
            Ok(meta) if meta.is_dir() => {
                let mut entries = tokio::fs::read_dir(destination).await.map_err(unexpected)?;
                if entries.next_entry().await.map_err(unexpected)?.is_some() {
                    return Err((
                        ErrorKind::InvalidInput,
                        format!(
                            "Destination {} already exists and is not empty",
                            destination.display()
                        ),
                    ));
                }
                Ok(false)
            }
            Ok(_) => Err((
                ErrorKind::InvalidInput,
                format!("Destination {} already exists and is not a directory", destination.display()),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = destination.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent).await.map_err(unexpected)?;
                }
                Ok(true)
            }
            Err(e) => Err(unexpected(e)),
        }
    }
}

#[async_trait]
impl Acquirer for GitAcquirer {
    async fn acquire(
        &self,
        repo_locator: &str,
        destination: &Path,
        timeout: Duration,
    ) -> AcquisitionResult {
        let started = Instant::now();

        let Some(locator) = parse_locator(repo_locator) else {
            tracing::error!("Invalid URL format: {repo_locator}");
            return AcquisitionResult::failed(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid URL format: {repo_locator}. Expected https://github.com/username/repo"
                ),
                started.elapsed(),
            );
        };

        let created = match Self::prepare_destination(destination).await {
            Ok(created) => created,
            Err((kind, message)) => {
                tracing::error!("{message}");
                return AcquisitionResult::failed(kind, message, started.elapsed());
            }
        };

        let url = locator.clone_url();
        let mut args: Vec<OsString> = vec!["clone".into()];
        args.extend(self.clone_args.iter().map(OsString::from));
        args.push(url.clone().into());
        args.push(destination.as_os_str().to_os_string());
        let env: [(OsString, OsString); 1] = [("GIT_TERMINAL_PROMPT".into(), "0".into())];

        tracing::info!(
            "Cloning {} to {} with timeout {}s",
            url,
            destination.display(),
            format_secs(timeout)
        );

        match process::run_collect(&self.program, &args, None, &env, Some(timeout)).await {
            Ok(RunOutcome::Finished(collected)) if collected.status.success() => {
                let canonical = match tokio::fs::canonicalize(destination).await {
                    Ok(path) => tokio::fs::metadata(&path)
                        .await
                        .is_ok_and(|meta| meta.is_dir())
                        .then_some(path),
                    Err(_) => None,
                };
                match canonical {
                    Some(path) => {
                        tracing::info!(
                            "Successfully cloned {} in {:.2}s",
                            url,
                            started.elapsed().as_secs_f64()
                        );
                        AcquisitionResult::success(path, started.elapsed())
                    }
                    None => {
                        Self::discard_partial(destination, created).await;
                        AcquisitionResult::failed(
                            ErrorKind::Unexpected,
                            format!(
                                "Unexpected error: clone reported success but {} is missing",
                                destination.display()
                            ),
                            started.elapsed(),
                        )
                    }
                }
            }
            Ok(RunOutcome::Finished(collected)) => {
                let (kind, message) = classify_failure(&collected.stderr_text());
                tracing::error!("Clone failed: {message}");
                Self::discard_partial(destination, created).await;
                AcquisitionResult::failed(kind, message, started.elapsed())
            }
            Ok(RunOutcome::TimedOut { .. }) => {
                let secs = format_secs(timeout);
                tracing::error!("Clone timeout after {secs}s");
                Self::discard_partial(destination, created).await;
                AcquisitionResult::failed(
                    ErrorKind::Timeout,
                    format!("Clone operation timed out after {secs} seconds"),
                    started.elapsed(),
                )
            }
            Err(e) => {
                tracing::error!("Unexpected error during clone: {e:#}");
                Self::discard_partial(destination, created).await;
                AcquisitionResult::failed(
                    ErrorKind::Unexpected,
                    format!("Unexpected error: {e:#}"),
                    started.elapsed(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_git_errors() {
        let cases = [
            ("remote: Repository not found.\nfatal: repository 'x' not found", ErrorKind::NotFound),
            (
                "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
                ErrorKind::AccessDenied,
            ),
            ("fatal: Authentication failed for 'https://github.com/a/b.git/'", ErrorKind::AccessDenied),
            ("fatal: unable to access 'x': Could not resolve host: github.com", ErrorKind::NetworkError),
            ("fatal: early EOF", ErrorKind::Unexpected),
            ("", ErrorKind::Unexpected),
        ];
        for (stderr, expected) in cases {
            assert_eq!(classify_failure(stderr).0, expected, "{stderr}");
        }
    }

    #[test]
    fn timeout_seconds_are_readable() {
        assert_eq!(format_secs(Duration::from_secs(60)), "60");
        assert_eq!(format_secs(Duration::from_millis(1500)), "1.5");
    }
}
