#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grading configuration: defaults, environment overrides and validation.

use std::{path::PathBuf, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{analyze::ExcludeSet, error::ConfigError};

/// Default number of concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default per-acquisition timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default code-line threshold above which a file counts towards the grade.
pub const DEFAULT_LINE_THRESHOLD: usize = 150;

/// Default source-file extension.
pub const DEFAULT_EXTENSION: &str = ".py";

/// Default exclusion globs: virtual environments, bytecode caches, test
/// modules and packaging/test-runner configuration.
pub fn default_exclude_patterns() -> Vec<String> {
    [
        "**/venv/**",
        "**/.venv/**",
        "**/__pycache__/**",
        "**/test_*.py",
        "**/*_test.py",
        "**/setup.py",
        "**/conftest.py",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Default `git clone` arguments producing a depth-1 clone.
pub fn default_clone_args() -> Vec<String> {
    vec!["--depth".to_string(), "1".to_string()]
}

/// Default scratch area for repository copies.
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("repograde")
}

/// Settings consumed by the code metrics analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// File extension of source files, with leading dot.
    pub extension:             String,
    /// Exclusion globs matched against repository-relative paths.
    pub exclude_patterns:      Vec<String>,
    /// Files with strictly more code lines than this are above threshold.
    pub line_threshold:        usize,
    /// Line-level comment marker.
    pub comment_marker:        String,
    /// Whether blank lines are excluded from the count.
    pub exclude_blank_lines:   bool,
    /// Whether comment lines are excluded from the count.
    pub exclude_comments:      bool,
    /// Whether triple-quoted literals are excluded from the count.
    pub exclude_documentation: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        GradingConfig::default().analyzer_settings()
    }
}

/// Configuration for one grading batch. Constructed once, validated, and
/// passed into the orchestrator; it is never mutated while a batch runs.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct GradingConfig {
    /// Upper bound on concurrently processed submissions.
    #[builder(default = DEFAULT_MAX_WORKERS)]
    max_workers:           usize,
    /// Time budget for each repository acquisition.
    #[builder(default = Duration::from_secs(DEFAULT_TIMEOUT_SECS))]
    acquisition_timeout:   Duration,
    /// Code-line threshold, strictly greater-than.
    #[builder(default = DEFAULT_LINE_THRESHOLD)]
    line_threshold:        usize,
    /// Remove each repository copy once it has been graded.
    #[builder(default = true)]
    delete_after_grading:  bool,
    /// Source-file extension, leading dot optional.
    #[builder(default = DEFAULT_EXTENSION.to_string())]
    source_file_extension: String,
    /// Exclusion globs.
    #[builder(default = default_exclude_patterns())]
    exclude_patterns:      Vec<String>,
    /// Line-level comment marker.
    #[builder(default = "#".to_string())]
    comment_marker:        String,
    /// Exclude blank lines from code counts.
    #[builder(default = true)]
    exclude_blank_lines:   bool,
    /// Exclude comment lines from code counts.
    #[builder(default = true)]
    exclude_comments:      bool,
    /// Exclude triple-quoted literals from code counts.
    #[builder(default = true)]
    exclude_documentation: bool,
    /// Version-control program used for acquisition.
    #[builder(default = "git".to_string())]
    git_program:           String,
    /// Arguments inserted between `clone` and the locator.
    #[builder(default = default_clone_args())]
    clone_args:            Vec<String>,
    /// Directory under which per-submission copies are created.
    #[builder(default = default_scratch_root(), into)]
    scratch_root:          PathBuf,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GradingConfig {
    /// Builds a configuration from `REPOGRADE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::builder()
            .max_workers(read_env("REPOGRADE_MAX_WORKERS", DEFAULT_MAX_WORKERS))
            .acquisition_timeout(read_timeout_secs("REPOGRADE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))
            .line_threshold(read_env("REPOGRADE_LINE_THRESHOLD", DEFAULT_LINE_THRESHOLD))
            .delete_after_grading(read_flag("REPOGRADE_DELETE_AFTER_GRADING", true))
            .maybe_source_file_extension(read_string("REPOGRADE_EXTENSION"))
            .maybe_git_program(read_string("REPOGRADE_GIT"))
            .maybe_scratch_root(read_string("REPOGRADE_SCRATCH_DIR").map(PathBuf::from))
            .build()
    }

    /// Checks every value; a failure here is fatal for the batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.acquisition_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.source_file_extension.trim_start_matches('.').trim().is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if self.comment_marker.trim().is_empty() {
            return Err(ConfigError::EmptyCommentMarker);
        }
        ExcludeSet::new(&self.exclude_patterns)?;
        Ok(())
    }

    /// Returns the worker bound.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the per-acquisition timeout.
    pub fn acquisition_timeout(&self) -> Duration {
        self.acquisition_timeout
    }

    /// Returns the code-line threshold.
    pub fn line_threshold(&self) -> usize {
        self.line_threshold
    }

    /// Whether copies are removed after grading. When false, reclaiming the
    /// scratch area is the caller's responsibility.
    pub fn delete_after_grading(&self) -> bool {
        self.delete_after_grading
    }

    /// Returns the configured source extension, normalized to a leading dot.
    pub fn source_file_extension(&self) -> String {
        format!(".{}", self.source_file_extension.trim().trim_start_matches('.'))
    }

    /// Returns the exclusion globs.
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// Returns the version-control program.
    pub fn git_program(&self) -> &str {
        &self.git_program
    }

    /// Returns the clone arguments.
    pub fn clone_args(&self) -> &[String] {
        &self.clone_args
    }

    /// Returns the scratch root.
    pub fn scratch_root(&self) -> &std::path::Path {
        &self.scratch_root
    }

    /// Returns the subset of settings the analyzer needs.
    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            extension:             self.source_file_extension(),
            exclude_patterns:      self.exclude_patterns.clone(),
            line_threshold:        self.line_threshold,
            comment_marker:        self.comment_marker.clone(),
            exclude_blank_lines:   self.exclude_blank_lines,
            exclude_comments:      self.exclude_comments,
            exclude_documentation: self.exclude_documentation,
        }
    }

    /// Returns a copy with a different worker bound.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Returns a copy with a different acquisition timeout.
    pub fn with_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    /// Returns a copy with a different line threshold.
    pub fn with_line_threshold(mut self, threshold: usize) -> Self {
        self.line_threshold = threshold;
        self
    }

    /// Returns a copy with cleanup enabled or disabled.
    pub fn with_delete_after_grading(mut self, delete: bool) -> Self {
        self.delete_after_grading = delete;
        self
    }
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Parses an environment variable, falling back to `default`.
fn read_env<T: std::str::FromStr>(env: &str, default: T) -> T {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Reads a boolean flag; accepts `1/0`, `true/false`, `yes/no`.
fn read_flag(env: &str, default: bool) -> bool {
    match std::env::var(env)
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
    {
        Ok("1" | "true" | "yes" | "on") => true,
        Ok("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Reads a non-empty trimmed string.
fn read_string(env: &str) -> Option<String> {
    std::env::var(env)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
