#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::error::ErrorKind;

/// Whether an upstream collaborator considers a submission ready to grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// The submission carries a usable repository locator.
    #[default]
    Ready,
    /// The submission is incomplete and must be skipped.
    #[serde(alias = "Not Ready", alias = "Pending")]
    NotReady,
}

/// One student's unit of work, as handed over by the submission source.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct SubmissionRecord {
    /// Identifier, unique within a batch.
    #[serde(alias = "email_id")]
    pub id:           String,
    /// Reference to the remote repository.
    #[serde(rename = "repo_url", alias = "repo_locator")]
    pub repo_locator: String,
    /// Readiness flag; only `Ready` records are graded.
    #[builder(default)]
    #[serde(default)]
    pub status:       SubmissionStatus,
}

impl SubmissionRecord {
    /// Returns true when the record should enter the grading pipeline.
    pub fn is_ready(&self) -> bool {
        self.status == SubmissionStatus::Ready
    }
}

/// Outcome status of a graded submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeStatus {
    /// The repository was acquired and analyzed.
    Ready,
    /// Acquisition or analysis failed; the grade is zero.
    Failed,
}

impl Display for GradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradeStatus::Ready => write!(f, "Ready"),
            GradeStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// The durable output of the pipeline for one submission.
#[derive(Debug, Clone, PartialEq, Tabled, Serialize, Deserialize)]
pub struct GradeRecord {
    /// Matches [`SubmissionRecord::id`].
    #[tabled(rename = "Submission")]
    #[serde(rename = "email_id", alias = "id")]
    pub id:         String,
    /// Percentage grade in `[0, 100]`.
    #[tabled(rename = "Grade", display = "display_grade")]
    pub grade:      f64,
    /// Whether grading succeeded.
    #[tabled(rename = "Status")]
    pub status:     GradeStatus,
    /// Failure category, absent for graded records.
    #[tabled(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure description, absent for graded records.
    #[tabled(rename = "Error", display = "display_error")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:      Option<String>,
}

impl GradeRecord {
    /// A successfully graded submission.
    pub fn graded(id: impl Into<String>, grade: f64) -> Self {
        Self {
            id: id.into(),
            grade,
            status: GradeStatus::Ready,
            error_kind: None,
            error: None,
        }
    }

    /// A submission that could not be graded; its grade is always zero.
    pub fn failed(id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id:         id.into(),
            grade:      0.0,
            status:     GradeStatus::Failed,
            error_kind: Some(kind),
            error:      Some(message.into()),
        }
    }

    /// Returns true if the record is ready for downstream feedback generation.
    pub fn is_ready(&self) -> bool {
        self.status == GradeStatus::Ready
    }
}

/// Formats a grade for table output.
fn display_grade(grade: &f64) -> String {
    format!("{grade:.2}")
}

/// Formats an optional error for table output.
fn display_error(error: &Option<String>) -> String {
    error.clone().unwrap_or_default()
}

/// Result of one call to [`crate::orchestrator::GradingOrchestrator::process`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// One record per `Ready` submission, in input order.
    pub grades:       Vec<GradeRecord>,
    /// Number of records with status `Ready`.
    pub graded_count: usize,
    /// Number of records with status `Failed`.
    pub failed_count: usize,
}

impl BatchOutcome {
    /// Builds the outcome and its counts from an ordered list of records.
    pub fn from_grades(grades: Vec<GradeRecord>) -> Self {
        let graded_count = grades.iter().filter(|g| g.is_ready()).count();
        let failed_count = grades.len() - graded_count;
        Self {
            grades,
            graded_count,
            failed_count,
        }
    }
}
