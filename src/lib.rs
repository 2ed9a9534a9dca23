//! # repograde
//!
//! Batch grader for student repositories: shallow-clones each ready
//! submission on a bounded worker pool, counts code lines per source file,
//! and grades the share of code living in files above a size threshold.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Repository acquisition through an external version-control process
pub mod acquire;
/// Source discovery, line classification and grading
pub mod analyze;
/// Batch configuration
pub mod config;
/// Error taxonomy
pub mod error;
/// The bounded worker pool driving a batch
pub mod orchestrator;
/// Subprocess execution with deadlines
pub mod process;
/// Batch input/output and table rendering
pub mod report;
/// Submission and grade records
pub mod types;
/// Utility functions for convenience
pub mod util;

pub use config::GradingConfig;
pub use error::{ErrorKind, GradingError};
pub use orchestrator::GradingOrchestrator;
pub use types::{BatchOutcome, GradeRecord, GradeStatus, SubmissionRecord, SubmissionStatus};

/// Grades `submissions` with the production acquirer and analyzer.
///
/// Returns one record per `Ready` submission, in input order. Fails only on
/// batch-level preconditions (invalid configuration, duplicate ids, unusable
/// scratch directory).
pub async fn process(
    submissions: &[SubmissionRecord],
    config: GradingConfig,
) -> Result<BatchOutcome, GradingError> {
    GradingOrchestrator::from_config(config)?
        .process(submissions)
        .await
}
