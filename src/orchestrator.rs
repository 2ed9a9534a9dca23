#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Batch grading: a bounded pool of workers, each running
//! acquire → analyze → grade → cleanup for one submission.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    acquire::{Acquirer, GitAcquirer},
    analyze::{Analyzer, CodeMetricsAnalyzer},
    config::GradingConfig,
    error::{ErrorKind, GradingError},
    types::{BatchOutcome, GradeRecord, SubmissionRecord},
};

/// Drop guard owning a local repository copy. Runs
/// [`Acquirer::cleanup`] exactly once when dropped, including during
/// unwinding, unless cleanup is disabled.
struct CleanupGuard {
    /// Acquirer that created the copy.
    acquirer: Arc<dyn Acquirer>,
    /// Copy to remove; `None` once handled or when cleanup is disabled.
    path:     Option<PathBuf>,
}

impl CleanupGuard {
    /// Takes ownership of `path`; a disabled guard leaves it on disk.
    fn new(acquirer: Arc<dyn Acquirer>, path: PathBuf, enabled: bool) -> Self {
        if !enabled {
            tracing::info!("Keeping repository copy at {}", path.display());
        }
        Self {
            acquirer,
            path: enabled.then_some(path),
        }
    }
}

impl CleanupGuard {
    /// Runs cleanup on the blocking pool and disarms the guard.
    async fn finish(mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let acquirer = Arc::clone(&self.acquirer);
        let target = path.clone();
        match tokio::task::spawn_blocking(move || acquirer.cleanup(&target)).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Cleanup failed for {}", path.display()),
            Err(e) => tracing::error!("Cleanup of {} aborted: {e}", path.display()),
        }
    }
}

/// Fallback for unwinding or a cancelled worker; the normal path goes
/// through [`CleanupGuard::finish`].
impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && !self.acquirer.cleanup(&path)
        {
            tracing::warn!("Cleanup failed for {}", path.display());
        }
    }
}

/// Turns a submission id into a safe directory-name prefix.
fn scratch_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    format!("{}-{}", cleaned, Uuid::new_v4().simple())
}

/// Everything one worker needs; cheap to clone into each task.
#[derive(Clone)]
struct Worker {
    /// Repository acquirer.
    acquirer:     Arc<dyn Acquirer>,
    /// Code analyzer.
    analyzer:     Arc<dyn Analyzer>,
    /// Per-acquisition time budget.
    timeout:      Duration,
    /// Remove copies after grading.
    delete_after: bool,
    /// Parent of every per-submission copy.
    scratch_root: PathBuf,
}

impl Worker {
    /// Grades one submission. Every failure becomes a `Failed` record.
    async fn grade(self, submission: SubmissionRecord) -> GradeRecord {
        let id = submission.id;
        tracing::info!("Processing repository for submission {id}");

        let destination = self.scratch_root.join(scratch_name(&id));
        let acquisition = self
            .acquirer
            .acquire(&submission.repo_locator, &destination, self.timeout)
            .await;

        let succeeded = acquisition.is_success();
        let local_path = match acquisition.local_path {
            Some(path) if succeeded => path,
            _ => {
                let kind = acquisition.error_kind.unwrap_or(ErrorKind::Unexpected);
                let message = acquisition
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string());
                tracing::warn!("Clone failed for {id} ({kind}): {message}");
                return GradeRecord::failed(id, kind, format!("Clone failed: {message}"));
            }
        };
        tracing::info!("Cloned to {}", local_path.display());

        let cleanup =
            CleanupGuard::new(Arc::clone(&self.acquirer), local_path.clone(), self.delete_after);

        let analyzer = Arc::clone(&self.analyzer);
        let analysis = tokio::task::spawn_blocking(move || analyzer.analyze(&local_path)).await;

        let record = match analysis {
            Ok(Ok(result)) => {
                tracing::info!("Grade for {id}: {:.2}", result.grade);
                GradeRecord::graded(id, result.grade)
            }
            Ok(Err(e)) => {
                tracing::warn!("Analysis failed for {id}: {e}");
                GradeRecord::failed(id, e.kind(), format!("Analysis failed: {e}"))
            }
            Err(e) => {
                tracing::error!("Analysis aborted for {id}: {e}");
                GradeRecord::failed(id, ErrorKind::AnalysisError, format!("Analysis aborted: {e}"))
            }
        };

        cleanup.finish().await;
        record
    }
}

/// Writes `record` into its slot; each slot is written once.
fn store(slots: &Mutex<Vec<Option<GradeRecord>>>, index: usize, record: GradeRecord) {
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = slots.get_mut(index) {
        debug_assert!(slot.is_none(), "slot {index} written twice");
        *slot = Some(record);
    }
}

/// Drives a batch of submissions through acquisition and analysis.
pub struct GradingOrchestrator {
    /// Validated batch configuration.
    config:   GradingConfig,
    /// Repository acquirer shared by all workers.
    acquirer: Arc<dyn Acquirer>,
    /// Code analyzer shared by all workers.
    analyzer: Arc<dyn Analyzer>,
}

impl GradingOrchestrator {
    /// Creates an orchestrator from explicit components. Fails if the
    /// configuration does not validate.
    pub fn new(
        config: GradingConfig,
        acquirer: Arc<dyn Acquirer>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, GradingError> {
        config.validate()?;
        Ok(Self {
            config,
            acquirer,
            analyzer,
        })
    }

    /// Creates an orchestrator with the `git` acquirer and the code metrics
    /// analyzer.
    pub fn from_config(config: GradingConfig) -> Result<Self, GradingError> {
        config.validate()?;
        let acquirer = Arc::new(GitAcquirer::from_config(&config));
        let analyzer = Arc::new(CodeMetricsAnalyzer::new(config.analyzer_settings())?);
        Self::new(config, acquirer, analyzer)
    }

    /// Returns the configuration this orchestrator runs with.
    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Checks batch-level preconditions before anything is dispatched.
    async fn check_batch(&self, ready: &[SubmissionRecord]) -> Result<(), GradingError> {
        let mut seen = HashSet::new();
        if let Some(dup) = ready.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(GradingError::DuplicateSubmission(dup.id.clone()));
        }
        ensure_scratch(self.config.scratch_root()).await
    }

    /// Grades every `Ready` submission and returns one record per ready
    /// submission, in input order.
    ///
    /// Per-submission failures never abort the batch; only batch-level
    /// preconditions return `Err`, and then nothing has been dispatched.
    pub async fn process(
        &self,
        submissions: &[SubmissionRecord],
    ) -> Result<BatchOutcome, GradingError> {
        let ready: Vec<SubmissionRecord> = submissions
            .iter()
            .filter(|s| s.is_ready())
            .cloned()
            .collect();

        tracing::info!(
            "Processing {} repositories (of {} total)",
            ready.len(),
            submissions.len()
        );
        if ready.is_empty() {
            tracing::warn!("No ready submissions to process");
            return Ok(BatchOutcome::default());
        }
        self.check_batch(&ready).await?;

        let slots: Arc<Mutex<Vec<Option<GradeRecord>>>> =
            Arc::new(Mutex::new(vec![None; ready.len()]));
        let permits = Arc::new(Semaphore::new(self.config.max_workers()));
        let worker = Worker {
            acquirer:     Arc::clone(&self.acquirer),
            analyzer:     Arc::clone(&self.analyzer),
            timeout:      self.config.acquisition_timeout(),
            delete_after: self.config.delete_after_grading(),
            scratch_root: self.config.scratch_root().to_path_buf(),
        };

        let mut tasks = JoinSet::new();
        for (index, submission) in ready.iter().cloned().enumerate() {
            let worker = worker.clone();
            let slots = Arc::clone(&slots);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let id = submission.id.clone();
                let span = tracing::info_span!("submission", id = %id);

                let record = match tokio::spawn(worker.grade(submission).instrument(span)).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::error!("Worker for {id} did not finish: {e}");
                        GradeRecord::failed(
                            id,
                            ErrorKind::Unexpected,
                            format!("Worker task failed: {e}"),
                        )
                    }
                };
                store(&slots, index, record);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Grading task failed: {e}");
            }
        }

        let filled = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
        let grades: Vec<GradeRecord> = filled
            .into_iter()
            .zip(&ready)
            .map(|(slot, submission)| {
                slot.unwrap_or_else(|| {
                    GradeRecord::failed(
                        submission.id.clone(),
                        ErrorKind::Unexpected,
                        "Worker produced no result",
                    )
                })
            })
            .collect();

        let outcome = BatchOutcome::from_grades(grades);
        tracing::info!(
            "Grading complete: {} successful, {} failed",
            outcome.graded_count,
            outcome.failed_count
        );
        Ok(outcome)
    }
}

/// Creates the scratch root if needed.
async fn ensure_scratch(root: &Path) -> Result<(), GradingError> {
    tokio::fs::create_dir_all(root).await.map_err(|source| GradingError::Scratch {
        path: root.to_path_buf(),
        source,
    })
}
