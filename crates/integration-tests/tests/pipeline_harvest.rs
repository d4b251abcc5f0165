//! Pipeline harvest tests
//!
//! Drive the full Pipeline -> UnitExecutor -> FileReconciler chain with a
//! scripted runner whose side effects stand in for real units.

use harvest_core::application::{FileReconciler, NotebookDocument, Pipeline, UnitExecutor};
use harvest_core::domain::{ChangeDetection, Job, JobStatus, ProtectedPaths, SkipReason};
use harvest_core::port::id_provider::SequentialIdProvider;
use harvest_core::port::time_provider::SystemTimeProvider;
use harvest_core::port::unit_runner::mocks::{MockBehavior, MockUnitRunner};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const NOTEBOOK: &str = r#"{"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5}"#;

struct Project {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("Scripts")).unwrap();
        fs::create_dir_all(root.join("Data")).unwrap();
        Self { _dir: dir, root }
    }

    fn scripts(&self) -> PathBuf {
        self.root.join("Scripts")
    }

    /// A file that existed well before the run started
    fn old_file(&self, path: &Path, body: &str) {
        fs::write(path, body).unwrap();
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();
    }

    fn pipeline(&self, jobs: Vec<Job>, runner: Arc<MockUnitRunner>) -> Pipeline {
        self.pipeline_with(jobs, runner, ChangeDetection::Timestamp)
    }

    fn pipeline_with(
        &self,
        jobs: Vec<Job>,
        runner: Arc<MockUnitRunner>,
        detection: ChangeDetection,
    ) -> Pipeline {
        let reconciler =
            FileReconciler::new(ProtectedPaths::new([self.root.join("Data")]), detection);
        let executor = UnitExecutor::new(
            runner,
            reconciler,
            self.root.join("executed_notebooks"),
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::new("cell")),
        );
        Pipeline::new(
            jobs,
            Arc::new(executor),
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::new("run")),
        )
    }
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_only_new_or_updated_files_are_harvested() {
    let project = Project::new();
    let scripts = project.scripts();
    fs::write(scripts.join("KPI_mine.ipynb"), NOTEBOOK).unwrap();
    project.old_file(&scripts.join("a.csv"), "untouched");
    project.old_file(&scripts.join("b.csv"), "stale");
    project.old_file(&scripts.join("notes.txt"), "not tracked");

    let runner = Arc::new(MockUnitRunner::new_success().with_effect(|work_dir| {
        fs::write(work_dir.join("b.csv"), "fresh").unwrap();
        fs::write(work_dir.join("revenue.jpg"), "jpeg").unwrap();
        fs::write(work_dir.join("log.txt"), "ignored").unwrap();
    }));
    let jobs = vec![Job::new(
        scripts.join("KPI_mine.ipynb"),
        project.root.join("KPI"),
    )];
    let report = project.pipeline(jobs, runner).run().await;

    assert!(!report.has_failures());
    assert_eq!(names(&project.root.join("KPI")), vec!["b.csv", "revenue.jpg"]);
    assert_eq!(
        fs::read_to_string(project.root.join("KPI").join("b.csv")).unwrap(),
        "fresh"
    );
    assert!(scripts.join("a.csv").exists());
    assert!(scripts.join("log.txt").exists());
    assert!(scripts.join("notes.txt").exists());
    assert_eq!(report.artifacts_moved(), 2);
}

#[tokio::test]
async fn test_untouched_directory_yields_nothing() {
    let project = Project::new();
    let scripts = project.scripts();
    fs::write(scripts.join("quiet.py"), "").unwrap();
    project.old_file(&scripts.join("existing.jpg"), "jpeg");
    project.old_file(&scripts.join("existing.csv"), "a,b\n");

    let report = project
        .pipeline(
            vec![Job::new(scripts.join("quiet.py"), project.root.join("Out"))],
            Arc::new(MockUnitRunner::new_success()),
        )
        .run()
        .await;

    assert_eq!(report.jobs[0].status, JobStatus::Succeeded);
    assert!(report.jobs[0].moved.is_empty());
    assert!(names(&project.root.join("Out")).is_empty());
    assert!(scripts.join("existing.jpg").exists());
}

#[tokio::test]
async fn test_same_named_artifacts_across_jobs_are_all_kept() {
    let project = Project::new();
    let scripts = project.scripts();
    fs::write(scripts.join("KPI_mine.ipynb"), NOTEBOOK).unwrap();
    fs::write(scripts.join("RecentKPIs.ipynb"), NOTEBOOK).unwrap();
    fs::write(scripts.join("Extra.ipynb"), NOTEBOOK).unwrap();

    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = counter.clone();
    let runner = Arc::new(MockUnitRunner::new_success().with_effect(move |work_dir| {
        let n = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        fs::write(work_dir.join("summary.csv"), format!("run {n}")).unwrap();
    }));
    let kpi = project.root.join("KPI");
    let jobs = vec![
        Job::new(scripts.join("KPI_mine.ipynb"), &kpi),
        Job::new(scripts.join("RecentKPIs.ipynb"), &kpi),
        Job::new(scripts.join("Extra.ipynb"), &kpi),
    ];
    let report = project.pipeline(jobs, runner).run().await;

    assert!(!report.has_failures());
    assert_eq!(
        names(&kpi),
        vec!["summary.csv", "summary_1.csv", "summary_2.csv"]
    );
    assert_eq!(fs::read_to_string(kpi.join("summary.csv")).unwrap(), "run 0");
    assert_eq!(fs::read_to_string(kpi.join("summary_1.csv")).unwrap(), "run 1");
    assert_eq!(fs::read_to_string(kpi.join("summary_2.csv")).unwrap(), "run 2");
}

#[tokio::test]
async fn test_protected_directory_is_never_harvested() {
    let project = Project::new();
    let data = project.root.join("Data");
    fs::write(data.join("prepare.py"), "").unwrap();
    project.old_file(&data.join("raw.csv"), "source data");
    fs::write(project.scripts().join("Cleaning.py"), "").unwrap();

    let runner = Arc::new(MockUnitRunner::new_success().with_effect(|work_dir| {
        // Both units rewrite something next to themselves
        fs::write(work_dir.join("cleaned.csv"), "rows").unwrap();
    }));
    let jobs = vec![
        // A unit living in the protected folder: nothing there may move
        Job::new(data.join("prepare.py"), project.root.join("Elsewhere")),
        // Protected folder as destination is fine
        Job::new(project.scripts().join("Cleaning.py"), &data),
    ];
    let report = project.pipeline(jobs, runner).run().await;

    assert!(!report.has_failures());
    assert!(report.jobs[0].moved.is_empty());
    assert!(names(&project.root.join("Elsewhere")).is_empty());
    // The first unit's own output stays in Data; the second one's lands beside it
    assert_eq!(
        names(&data),
        vec!["cleaned.csv", "cleaned_1.csv", "prepare.py", "raw.csv"]
    );
    assert_eq!(fs::read_to_string(data.join("raw.csv")).unwrap(), "source data");
    assert_eq!(report.jobs[1].moved.len(), 1);
    assert!(!project.scripts().join("cleaned.csv").exists());
}

#[tokio::test]
async fn test_failures_do_not_stop_the_run() {
    let project = Project::new();
    let scripts = project.scripts();
    fs::write(scripts.join("segmentation.ipynb"), NOTEBOOK).unwrap();
    fs::write(scripts.join("forecast.py"), "").unwrap();
    fs::write(scripts.join("README.md"), "").unwrap();

    let runner = Arc::new(MockUnitRunner::new(MockBehavior::ExitCode(1)).with_effect(
        |work_dir| {
            fs::write(work_dir.join("partial.csv"), "half done").unwrap();
        },
    ));
    let jobs = vec![
        Job::new(scripts.join("Missing.ipynb"), project.root.join("KPI")),
        Job::new(scripts.join("segmentation.ipynb"), project.root.join("Segmentation")),
        Job::new(scripts.join("README.md"), project.root.join("Docs")),
        Job::new(scripts.join("forecast.py"), project.root.join("Prédiction")),
    ];
    let report = project.pipeline(jobs, runner.clone()).run().await;

    assert_eq!(report.jobs.len(), 4);
    assert_eq!(
        report.jobs[0].status,
        JobStatus::Skipped {
            reason: SkipReason::MissingInput
        }
    );
    assert!(report.jobs[1].is_failed());
    assert_eq!(
        report.jobs[2].status,
        JobStatus::Skipped {
            reason: SkipReason::UnsupportedType
        }
    );
    assert!(report.jobs[3].is_failed());
    assert_eq!(runner.call_count(), 2);
    assert!(report.has_failures());
    assert_eq!(report.failed(), 2);

    // Whatever a failed unit produced is still collected
    assert_eq!(names(&project.root.join("Segmentation")), vec!["partial.csv"]);
    assert_eq!(names(&project.root.join("Prédiction")), vec!["partial.csv"]);
    assert!(!project.root.join("KPI").exists());
}

#[tokio::test]
async fn test_content_detection_catches_same_timestamp_rewrites() {
    let project = Project::new();
    let scripts = project.scripts();
    fs::write(scripts.join("KPI_mine.py"), "").unwrap();
    project.old_file(&scripts.join("kpi.csv"), "old numbers");
    project.old_file(&scripts.join("same.csv"), "unchanged");
    let frozen = fs::metadata(scripts.join("kpi.csv")).unwrap().modified().unwrap();

    let runner = Arc::new(MockUnitRunner::new_success().with_effect(move |work_dir| {
        let path = work_dir.join("kpi.csv");
        fs::write(&path, "new numbers").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(frozen)
            .unwrap();
    }));
    let report = project
        .pipeline_with(
            vec![Job::new(scripts.join("KPI_mine.py"), project.root.join("KPI"))],
            runner,
            ChangeDetection::Content,
        )
        .run()
        .await;

    assert_eq!(report.jobs[0].moved.len(), 1);
    assert_eq!(names(&project.root.join("KPI")), vec!["kpi.csv"]);
    assert!(scripts.join("same.csv").exists());
}

#[tokio::test]
async fn test_archived_notebook_carries_capture_hook() {
    let project = Project::new();
    let unit = project.scripts().join("Analyse exploratoire.ipynb");
    fs::write(&unit, NOTEBOOK).unwrap();

    let runner = Arc::new(MockUnitRunner::new_success());
    let report = project
        .pipeline(
            vec![Job::new(&unit, project.root.join("Prédiction"))],
            runner.clone(),
        )
        .run()
        .await;

    let archived = project
        .root
        .join("executed_notebooks")
        .join("Analyse exploratoire__executed.ipynb");
    assert_eq!(
        report.jobs[0].archived_document.as_deref(),
        Some(archived.as_path())
    );
    let doc = NotebookDocument::load(&archived).unwrap();
    assert_eq!(doc.code_cell_count(), 1);
    let hook = doc.first_source().unwrap();
    assert!(hook.contains("Prédiction"));
    assert!(hook.contains("_os.chdir("));

    // The source notebook itself is left alone
    assert_eq!(fs::read_to_string(&unit).unwrap(), NOTEBOOK);
    assert_eq!(runner.notebook_runs()[0].document, archived);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let project = Project::new();
    fs::write(project.scripts().join("x.py"), "").unwrap();
    let report = project
        .pipeline(
            vec![
                Job::new(project.scripts().join("x.py"), project.root.join("X")),
                Job::new(project.scripts().join("gone.py"), project.root.join("X")),
            ],
            Arc::new(MockUnitRunner::new_success()),
        )
        .run()
        .await;

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["run_id"], "run-1");
    assert_eq!(value["jobs"][0]["status"]["state"], "SUCCEEDED");
    assert_eq!(value["jobs"][1]["status"]["state"], "SKIPPED");
    assert_eq!(value["jobs"][1]["status"]["reason"], "missing_input");
}
