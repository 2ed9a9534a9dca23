#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Reading submission batches and presenting grading results.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use itertools::Itertools;
use tabled::{Table, settings::Style};

use crate::{
    analyze::AnalysisResult,
    types::{BatchOutcome, GradeRecord, SubmissionRecord},
    util::round_grade,
};

/// Reads a JSON array of submission records.
pub fn read_submissions(path: &Path) -> Result<Vec<SubmissionRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read submissions from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Could not parse submissions in {}", path.display()))
}

/// Writes grade records as a pretty-printed JSON array with grades rounded to
/// two decimals, creating parent directories as needed.
pub fn write_grades(path: &Path, grades: &[GradeRecord]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let rounded: Vec<GradeRecord> = grades
        .iter()
        .cloned()
        .map(|mut record| {
            record.grade = round_grade(record.grade);
            record
        })
        .collect();
    let json = serde_json::to_string_pretty(&rounded).context("Could not serialize grades")?;
    std::fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))?;
    tracing::info!("Wrote {} grades to {}", grades.len(), path.display());
    Ok(())
}

/// Renders the grade records of a batch as a table followed by a summary.
pub fn render_batch(outcome: &BatchOutcome) -> String {
    let mut table = Table::new(&outcome.grades);
    table.with(Style::modern());

    let summary = format!(
        "Graded: {}  Failed: {}",
        outcome.graded_count.to_string().green(),
        if outcome.failed_count == 0 {
            outcome.failed_count.to_string().normal()
        } else {
            outcome.failed_count.to_string().red()
        }
    );
    format!("{table}\n{summary}")
}

/// Renders per-file metrics and repository totals.
pub fn render_analysis(result: &AnalysisResult, threshold: usize) -> String {
    let mut table = Table::new(&result.file_details);
    table.with(Style::modern());

    let large = result
        .file_details
        .iter()
        .filter(|f| f.above_threshold)
        .map(|f| f.relative_path.as_str())
        .join(", ");

    format!(
        "{table}\nFiles: {}  Code lines: {}  Lines in files over {threshold}: {}\nGrade: \
         {:.2}\nAbove threshold: {}",
        result.total_files,
        result.total_lines,
        result.lines_above_threshold,
        result.grade,
        if large.is_empty() { "none".to_string() } else { large }
    )
}
