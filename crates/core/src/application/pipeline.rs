// Pipeline - ordered job loop

use super::executor::UnitExecutor;
use crate::domain::{Job, JobReport, PipelineReport, SkipReason};
use crate::port::{IdProvider, TimeProvider};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Progress hooks for a running pipeline (progress lines, UIs)
pub trait PipelineObserver: Send + Sync {
    fn job_started(&self, _index: usize, _total: usize, _job: &Job) {}
    fn job_finished(&self, _index: usize, _total: usize, _report: &JobReport) {}
}

/// Observer that ignores everything
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Runs a fixed, ordered job table
///
/// Jobs run strictly one after another; each job's snapshot, execution and
/// reconciliation complete before the next job starts. A failing (or
/// panicking) job is recorded and the pipeline moves on.
pub struct Pipeline {
    jobs: Vec<Job>,
    executor: Arc<UnitExecutor>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn new(
        jobs: Vec<Job>,
        executor: Arc<UnitExecutor>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            jobs,
            executor,
            time_provider,
            id_provider,
            observer: Arc::new(SilentObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every job in order and collect their reports
    pub async fn run(&self) -> PipelineReport {
        let run_id = self.id_provider.generate_id();
        let mut report = PipelineReport::new(run_id.clone(), self.time_provider.now_millis());
        let total = self.jobs.len();

        info!(run_id = %run_id, jobs = total, "Pipeline started");

        for (index, job) in self.jobs.iter().enumerate() {
            self.observer.job_started(index, total, job);
            let job_report = self.run_job(job).await;
            self.observer.job_finished(index, total, &job_report);
            report.jobs.push(job_report);
        }

        report.finished_at = Some(self.time_provider.now_millis());
        info!(
            run_id = %run_id,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            artifacts = report.artifacts_moved(),
            "Pipeline finished"
        );
        report
    }

    /// Process one job (never fails: every outcome becomes a report)
    pub async fn run_job(&self, job: &Job) -> JobReport {
        let started_at = self.time_provider.now_millis();

        if !job.source_unit.exists() {
            warn!(unit = %job.source_unit.display(), "Unit not found, skipping");
            return JobReport::skipped(job.clone(), started_at, SkipReason::MissingInput);
        }
        if job.kind().is_none() {
            warn!(unit = %job.source_unit.display(), "Unsupported unit type, skipping");
            return JobReport::skipped(job.clone(), started_at, SkipReason::UnsupportedType);
        }

        if let Err(e) = std::fs::create_dir_all(&job.output_dir) {
            error!(dir = %job.output_dir.display(), error = %e, "Cannot create output directory");
            let mut report = JobReport::new(job.clone(), started_at);
            report.fail(format!("cannot create {}: {e}", job.output_dir.display()));
            return report;
        }

        // Execute in its own task: a panic inside the executor must not take
        // the remaining jobs down with it
        let executor = Arc::clone(&self.executor);
        let owned_job = job.clone();
        let handle = tokio::task::spawn(async move { executor.run(&owned_job).await });

        match handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(unit = %job.source_unit.display(), error = %e, "Job setup failed");
                let mut report = JobReport::new(job.clone(), started_at);
                report.fail(e.to_string());
                report.duration_ms = self.time_provider.now_millis() - started_at;
                report
            }
            Err(join_err) => {
                let cause = if join_err.is_panic() {
                    error!(unit = %job.source_unit.display(), "Job panicked: {:?}", join_err);
                    "executor panicked".to_string()
                } else {
                    error!(unit = %job.source_unit.display(), "Job cancelled: {:?}", join_err);
                    "executor task cancelled".to_string()
                };
                let mut report = JobReport::new(job.clone(), started_at);
                report.fail(cause);
                report.duration_ms = self.time_provider.now_millis() - started_at;
                report
            }
        }
    }
}
