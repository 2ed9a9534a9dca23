use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use repograde::{
    GradeStatus, GradingConfig, GradingError, GradingOrchestrator, SubmissionRecord,
    SubmissionStatus,
    acquire::{AcquisitionResult, Acquirer, remove_tree},
    analyze::{AnalysisResult, Analyzer, CodeMetricsAnalyzer},
    error::{AnalysisError, ConfigError, ErrorKind},
};
use uuid::Uuid;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("repograde-batch-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

fn code(lines: usize) -> String {
    (0..lines).map(|i| format!("x{i} = {i}\n")).collect()
}

/// What the fake acquirer does for one locator.
#[derive(Clone, Default)]
struct Plan {
    /// Code lines per file written into the copy.
    files: Vec<usize>,
    /// Simulated acquisition latency.
    delay: Duration,
    /// Fail with this kind instead of producing a copy.
    fail:  Option<ErrorKind>,
}

/// Acquirer that fabricates repositories on disk and records its calls.
#[derive(Default)]
struct FakeAcquirer {
    plans:    HashMap<String, Plan>,
    acquired: Mutex<Vec<PathBuf>>,
    cleaned:  Mutex<Vec<PathBuf>>,
    active:   AtomicUsize,
    peak:     AtomicUsize,
}

impl FakeAcquirer {
    fn with_plans(plans: impl IntoIterator<Item = (&'static str, Plan)>) -> Self {
        Self {
            plans: plans
                .into_iter()
                .map(|(locator, plan)| (locator.to_string(), plan))
                .collect(),
            ..Self::default()
        }
    }

    fn acquired(&self) -> Vec<PathBuf> {
        self.acquired.lock().expect("acquired lock").clone()
    }

    fn cleaned(&self) -> Vec<PathBuf> {
        self.cleaned.lock().expect("cleaned lock").clone()
    }
}

#[async_trait]
impl Acquirer for FakeAcquirer {
    async fn acquire(
        &self,
        repo_locator: &str,
        destination: &Path,
        _timeout: Duration,
    ) -> AcquisitionResult {
        let started = Instant::now();
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let plan = self.plans.get(repo_locator).cloned().unwrap_or_default();
        tokio::time::sleep(plan.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(kind) = plan.fail {
            return AcquisitionResult::failed(kind, "Repository not found", started.elapsed());
        }

        fs::create_dir_all(destination).expect("create copy");
        for (i, lines) in plan.files.iter().enumerate() {
            fs::write(destination.join(format!("mod{i}.py")), code(*lines)).expect("write module");
        }
        self.acquired
            .lock()
            .expect("acquired lock")
            .push(destination.to_path_buf());
        AcquisitionResult::success(destination.to_path_buf(), started.elapsed())
    }

    fn cleanup(&self, local_path: &Path) -> bool {
        self.cleaned
            .lock()
            .expect("cleaned lock")
            .push(local_path.to_path_buf());
        remove_tree(local_path)
    }
}

struct FailingAnalyzer;

impl Analyzer for FailingAnalyzer {
    fn analyze(&self, repository_path: &Path) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::NotADirectory(repository_path.to_path_buf()))
    }
}

struct PanickingAnalyzer;

impl Analyzer for PanickingAnalyzer {
    fn analyze(&self, _repository_path: &Path) -> Result<AnalysisResult, AnalysisError> {
        panic!("analyzer blew up");
    }
}

fn config(scratch: &Path) -> GradingConfig {
    GradingConfig::builder()
        .scratch_root(scratch.to_path_buf())
        .max_workers(2)
        .build()
}

fn real_analyzer(config: &GradingConfig) -> Arc<dyn Analyzer> {
    Arc::new(CodeMetricsAnalyzer::new(config.analyzer_settings()).expect("analyzer"))
}

fn submission(id: &str, locator: &str) -> SubmissionRecord {
    SubmissionRecord::builder()
        .id(id)
        .repo_locator(locator)
        .build()
}

#[tokio::test]
async fn output_follows_input_order() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    // later submissions finish first
    let acquirer = Arc::new(FakeAcquirer::with_plans([
        ("https://github.com/s/a", Plan {
            files: vec![200, 100],
            delay: Duration::from_millis(150),
            ..Plan::default()
        }),
        ("https://github.com/s/b", Plan {
            files: vec![10],
            delay: Duration::from_millis(100),
            ..Plan::default()
        }),
        ("https://github.com/s/c", Plan {
            files: vec![300],
            delay: Duration::from_millis(50),
            ..Plan::default()
        }),
        ("https://github.com/s/d", Plan {
            files: vec![],
            ..Plan::default()
        }),
    ]));
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let batch = [
        submission("a@example.edu", "https://github.com/s/a"),
        submission("b@example.edu", "https://github.com/s/b"),
        submission("c@example.edu", "https://github.com/s/c"),
        submission("d@example.edu", "https://github.com/s/d"),
    ];
    let outcome = orchestrator.process(&batch).await.expect("process");

    let ids: Vec<&str> = outcome.grades.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, ["a@example.edu", "b@example.edu", "c@example.edu", "d@example.edu"]);

    assert!((outcome.grades[0].grade - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(outcome.grades[1].grade, 0.0);
    assert_eq!(outcome.grades[2].grade, 100.0);
    assert_eq!(outcome.grades[3].grade, 0.0);
    assert!(outcome.grades.iter().all(|g| g.status == GradeStatus::Ready));
    assert_eq!(outcome.graded_count, 4);
    assert_eq!(outcome.failed_count, 0);

    assert!(acquirer.peak.load(Ordering::SeqCst) <= 2);
    for path in acquirer.acquired() {
        assert!(!path.exists(), "{} should be cleaned up", path.display());
    }

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn not_ready_submissions_are_skipped() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::default());
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let batch = [
        submission("ready", "https://github.com/s/r"),
        SubmissionRecord::builder()
            .id("pending")
            .repo_locator("https://github.com/s/p")
            .status(SubmissionStatus::NotReady)
            .build(),
    ];
    let outcome = orchestrator.process(&batch).await.expect("process");

    assert_eq!(outcome.grades.len(), 1);
    assert_eq!(outcome.grades[0].id, "ready");
    assert_eq!(acquirer.acquired().len(), 1);

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn batch_without_ready_submissions_is_empty() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::default());
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let outcome = orchestrator.process(&[]).await.expect("process");
    assert!(outcome.grades.is_empty());
    assert_eq!(outcome.graded_count + outcome.failed_count, 0);
    assert!(acquirer.acquired().is_empty());

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn one_failure_does_not_affect_the_rest() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::with_plans([
        ("https://github.com/s/ok", Plan {
            files: vec![200],
            ..Plan::default()
        }),
        ("https://github.com/s/gone", Plan {
            fail: Some(ErrorKind::NotFound),
            ..Plan::default()
        }),
    ]));
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let batch = [
        submission("one", "https://github.com/s/ok"),
        submission("two", "https://github.com/s/gone"),
        submission("three", "https://github.com/s/ok"),
    ];
    let outcome = orchestrator.process(&batch).await.expect("process");

    assert_eq!(outcome.graded_count, 2);
    assert_eq!(outcome.failed_count, 1);
    assert_eq!(outcome.graded_count + outcome.failed_count, batch.len());

    let failed = &outcome.grades[1];
    assert_eq!(failed.id, "two");
    assert_eq!(failed.status, GradeStatus::Failed);
    assert_eq!(failed.grade, 0.0);
    assert_eq!(failed.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(failed.error.as_deref(), Some("Clone failed: Repository not found"));

    assert_eq!(outcome.grades[0].grade, 100.0);
    assert_eq!(outcome.grades[2].grade, 100.0);
    // two copies, two cleanups
    assert_eq!(acquirer.cleaned().len(), 2);

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn analysis_failure_still_cleans_up_once() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::default());
    let orchestrator =
        GradingOrchestrator::new(cfg, acquirer.clone(), Arc::new(FailingAnalyzer)).expect("new");

    let outcome = orchestrator
        .process(&[submission("x", "https://github.com/s/x")])
        .await
        .expect("process");

    let record = &outcome.grades[0];
    assert_eq!(record.status, GradeStatus::Failed);
    assert_eq!(record.error_kind, Some(ErrorKind::AnalysisError));
    assert!(
        record
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Analysis failed:"))
    );

    let acquired = acquirer.acquired();
    assert_eq!(acquirer.cleaned(), acquired);
    assert!(!acquired[0].exists());

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn analyzer_panic_is_contained() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::default());
    let orchestrator =
        GradingOrchestrator::new(cfg, acquirer.clone(), Arc::new(PanickingAnalyzer)).expect("new");

    let batch = [
        submission("p1", "https://github.com/s/p1"),
        submission("p2", "https://github.com/s/p2"),
    ];
    let outcome = orchestrator.process(&batch).await.expect("process");

    assert_eq!(outcome.failed_count, 2);
    assert!(
        outcome
            .grades
            .iter()
            .all(|g| g.error_kind == Some(ErrorKind::AnalysisError))
    );
    assert_eq!(acquirer.cleaned().len(), 2);
    for path in acquirer.acquired() {
        assert!(!path.exists());
    }

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn copies_are_kept_when_cleanup_is_disabled() {
    let scratch = temp_root();
    let cfg = config(&scratch).with_delete_after_grading(false);
    let acquirer = Arc::new(FakeAcquirer::with_plans([("https://github.com/s/k", Plan {
        files: vec![5],
        ..Plan::default()
    })]));
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let outcome = orchestrator
        .process(&[submission("keep", "https://github.com/s/k")])
        .await
        .expect("process");

    assert_eq!(outcome.graded_count, 1);
    assert!(acquirer.cleaned().is_empty());
    let acquired = acquirer.acquired();
    assert!(acquired[0].join("mod0.py").exists());
    assert!(acquired[0].starts_with(&scratch));

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn duplicate_ids_abort_before_dispatch() {
    let scratch = temp_root();
    let cfg = config(&scratch);
    let acquirer = Arc::new(FakeAcquirer::default());
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let batch = [
        submission("same", "https://github.com/s/a"),
        submission("same", "https://github.com/s/b"),
    ];
    let err = orchestrator.process(&batch).await.expect_err("duplicate");

    assert!(matches!(err, GradingError::DuplicateSubmission(ref id) if id == "same"));
    assert!(acquirer.acquired().is_empty());

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let scratch = temp_root();
    let cfg = config(&scratch).with_max_workers(0);
    let result = GradingOrchestrator::new(
        cfg.clone(),
        Arc::new(FakeAcquirer::default()),
        Arc::new(FailingAnalyzer),
    );
    assert!(matches!(result, Err(GradingError::InvalidConfig(ConfigError::NoWorkers))));

    let err = repograde::process(&[submission("a", "https://github.com/s/a")], cfg)
        .await
        .expect_err("invalid config");
    assert!(matches!(err, GradingError::InvalidConfig(_)));

    fs::remove_dir_all(scratch).ok();
}

#[tokio::test]
async fn worker_bound_is_respected() {
    let scratch = temp_root();
    let cfg = config(&scratch).with_max_workers(3);
    let plans: Vec<(&'static str, Plan)> = [
        "https://github.com/s/1",
        "https://github.com/s/2",
        "https://github.com/s/3",
        "https://github.com/s/4",
        "https://github.com/s/5",
        "https://github.com/s/6",
        "https://github.com/s/7",
        "https://github.com/s/8",
    ]
    .into_iter()
    .map(|locator| {
        (locator, Plan {
            files: vec![1],
            delay: Duration::from_millis(40),
            ..Plan::default()
        })
    })
    .collect();
    let acquirer = Arc::new(FakeAcquirer::with_plans(plans.clone()));
    let orchestrator =
        GradingOrchestrator::new(cfg.clone(), acquirer.clone(), real_analyzer(&cfg)).expect("new");

    let batch: Vec<SubmissionRecord> = plans
        .iter()
        .enumerate()
        .map(|(i, (locator, _))| submission(&format!("s{i}"), locator))
        .collect();
    let outcome = orchestrator.process(&batch).await.expect("process");

    assert_eq!(outcome.graded_count, 8);
    let peak = acquirer.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 1);

    fs::remove_dir_all(scratch).ok();
}

#[cfg(unix)]
mod with_git {
    use std::os::unix::fs::PermissionsExt;

    use repograde::acquire::GitAcquirer;

    use super::*;

    /// Stand-in for `git` that hangs on locators naming `slow` and otherwise
    /// produces a single 200-line module.
    fn script_git(root: &Path) -> GitAcquirer {
        let path = root.join("fake-git.sh");
        let body = r#"#!/bin/sh
case "$2" in
    *slow*) exec sleep 30 ;;
esac
mkdir -p "$3"
i=0
while [ "$i" -lt 200 ]; do
    echo "x$i = $i" >> "$3/main.py"
    i=$((i + 1))
done
"#;
        fs::write(&path, body).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        GitAcquirer::new(path.to_string_lossy(), Vec::new())
    }

    #[tokio::test]
    async fn hung_clone_times_out_while_the_rest_are_graded() {
        let root = temp_root();
        let scratch = root.join("scratch");
        let limit = Duration::from_secs(1);
        let cfg = GradingConfig::builder()
            .scratch_root(scratch.clone())
            .max_workers(2)
            .acquisition_timeout(limit)
            .build();
        let orchestrator = GradingOrchestrator::new(
            cfg.clone(),
            Arc::new(script_git(&root)),
            real_analyzer(&cfg),
        )
        .expect("new");

        let batch = [
            submission("slow@example.edu", "https://github.com/s/slow"),
            submission("a@example.edu", "https://github.com/s/a"),
            submission("b@example.edu", "https://github.com/s/b"),
            submission("c@example.edu", "https://github.com/s/c"),
        ];
        let started = Instant::now();
        let outcome = orchestrator.process(&batch).await.expect("process");
        let elapsed = started.elapsed();

        assert!(elapsed < limit + Duration::from_secs(3), "batch took {elapsed:?}");

        let slow = &outcome.grades[0];
        assert_eq!(slow.id, "slow@example.edu");
        assert_eq!(slow.status, GradeStatus::Failed);
        assert_eq!(slow.error_kind, Some(ErrorKind::Timeout));
        for record in &outcome.grades[1..] {
            assert_eq!(record.status, GradeStatus::Ready, "{}", record.id);
            assert_eq!(record.grade, 100.0, "{}", record.id);
        }
        assert_eq!(outcome.graded_count, 3);
        assert_eq!(outcome.failed_count, 1);

        let leftovers = fs::read_dir(&scratch)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);

        fs::remove_dir_all(root).ok();
    }
}
