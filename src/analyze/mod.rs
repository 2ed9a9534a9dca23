#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Code metrics: which files count, how many code lines each has, and the
//! grade derived from them.

/// Source-file discovery and exclusion globs.
pub mod discover;
/// Line classification.
pub mod lines;
/// Per-file and per-repository metrics.
pub mod metrics;

use std::path::Path;

pub use discover::{ExcludeSet, find_source_files, relative_path};
pub use lines::{LineClassifier, LineKind, classify_lines, count_code_lines};
pub use metrics::{AnalysisResult, FileMetric, grade_files};

use crate::{
    config::AnalyzerSettings,
    error::{AnalysisError, ConfigError},
};

/// Computes code metrics for a local directory.
pub trait Analyzer: Send + Sync {
    /// Analyzes the tree rooted at `repository_path`.
    fn analyze(&self, repository_path: &Path) -> Result<AnalysisResult, AnalysisError>;
}

/// The production analyzer: discovery, line classification, threshold grade.
#[derive(Debug, Clone)]
pub struct CodeMetricsAnalyzer {
    /// Extension, threshold and classifier toggles.
    settings: AnalyzerSettings,
    /// Compiled exclusion globs.
    excludes: ExcludeSet,
}

impl CodeMetricsAnalyzer {
    /// Creates an analyzer, compiling the exclusion globs up front.
    pub fn new(settings: AnalyzerSettings) -> Result<Self, ConfigError> {
        let excludes = ExcludeSet::new(&settings.exclude_patterns)?;
        Ok(Self { settings, excludes })
    }

    /// Returns the analyzer's settings.
    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Counts the code lines in one file. Content that is not valid UTF-8
    /// counts as zero lines.
    fn count_file(&self, path: &Path) -> Result<usize, AnalysisError> {
        let bytes = std::fs::read(path).map_err(|source| AnalysisError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(count_code_lines(&text, &self.settings)),
            Err(_) => {
                tracing::warn!("{} is not valid UTF-8, counting it as empty", path.display());
                Ok(0)
            }
        }
    }
}

impl Analyzer for CodeMetricsAnalyzer {
    fn analyze(&self, repository_path: &Path) -> Result<AnalysisResult, AnalysisError> {
        tracing::info!("Starting analysis of repository: {}", repository_path.display());

        let files = find_source_files(repository_path, &self.settings.extension, &self.excludes)?;
        let counts = files
            .iter()
            .map(|path| {
                let lines = self.count_file(path)?;
                Ok((relative_path(path, repository_path), lines))
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        let result = grade_files(counts, self.settings.line_threshold);
        tracing::info!(
            "Analyzed {} files, {} code lines, {} above threshold, grade {:.2}",
            result.total_files,
            result.total_lines,
            result.lines_above_threshold,
            result.grade
        );
        Ok(result)
    }
}
