#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Code-line metrics for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Tabled, Serialize, Deserialize)]
pub struct FileMetric {
    /// Path relative to the repository root, `/`-separated.
    #[tabled(rename = "File")]
    pub relative_path:   String,
    /// Number of lines classified as code.
    #[tabled(rename = "Code lines")]
    pub code_line_count: usize,
    /// True iff `code_line_count` is strictly greater than the threshold.
    #[tabled(rename = "Above threshold")]
    pub above_threshold: bool,
}

/// Repository-level metrics and the derived grade.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Number of included source files.
    pub total_files:           usize,
    /// Sum of code lines over all included files.
    pub total_lines:           usize,
    /// Sum of code lines over files above the threshold.
    pub lines_above_threshold: usize,
    /// Number of files above the threshold.
    pub files_above_threshold: usize,
    /// `lines_above_threshold / total_lines * 100`, or 0 for no code.
    pub grade:                 f64,
    /// Per-file details, in discovery order.
    pub file_details:          Vec<FileMetric>,
}

/// Applies the threshold to per-file counts and computes the grade.
///
/// The grade is the share of code lines living in files with strictly more
/// than `threshold` code lines, as a percentage. No rounding is applied.
pub fn grade_files(
    counts: impl IntoIterator<Item = (String, usize)>,
    threshold: usize,
) -> AnalysisResult {
    let file_details: Vec<FileMetric> = counts
        .into_iter()
        .map(|(relative_path, code_line_count)| FileMetric {
            relative_path,
            code_line_count,
            above_threshold: code_line_count > threshold,
        })
        .collect();

    let total_lines: usize = file_details.iter().map(|f| f.code_line_count).sum();
    let (lines_above_threshold, files_above_threshold) = file_details
        .iter()
        .filter(|f| f.above_threshold)
        .fold((0usize, 0usize), |(lines, files), f| (lines + f.code_line_count, files + 1));

    let grade = if total_lines == 0 {
        0.0
    } else {
        (lines_above_threshold as f64 / total_lines as f64) * 100.0
    };

    AnalysisResult {
        total_files: file_details.len(),
        total_lines,
        lines_above_threshold,
        files_above_threshold,
        grade,
        file_details,
    }
}
