// Unit Executor - snapshot, instrument, run, harvest (one job)

use super::capture::CaptureManifest;
use super::constants::{CAPTURE_LOG_SUFFIX, EXECUTED_SUFFIX, PLOT_BACKEND, PLOT_BACKEND_ENV};
use super::instrumentation::{CaptureFragment, FigureNaming, ScriptDriver};
use super::notebook::NotebookDocument;
use super::reconciler::{FileReconciler, ReconcileReport};
use crate::domain::{ArtifactClass, DomainError, ExtensionSet, Job, JobReport, Snapshot, UnitKind};
use crate::error::{AppError, Result};
use crate::port::{
    ExecutionError, ExecutionResult, ExecutionStatus, IdProvider, NotebookRun, ScriptRun,
    TimeProvider, UnitRunner,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one analysis unit and harvests what it produced
///
/// For every job: snapshot the unit's directory, run it with the capture hook
/// installed, then move new or updated images and tables into the job's
/// output directory. Harvesting happens whether or not the unit succeeded.
pub struct UnitExecutor {
    runner: Arc<dyn UnitRunner>,
    reconciler: FileReconciler,
    archive_dir: PathBuf,
    env: HashMap<String, String>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl UnitExecutor {
    /// Create a new executor
    ///
    /// # Arguments
    /// * `runner` - Engine adapter that actually executes notebooks and scripts
    /// * `reconciler` - Snapshot/move engine, already configured with protected paths
    /// * `archive_dir` - Where executed notebooks and capture logs are kept
    pub fn new(
        runner: Arc<dyn UnitRunner>,
        reconciler: FileReconciler,
        archive_dir: impl Into<PathBuf>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            runner,
            reconciler,
            archive_dir: archive_dir.into(),
            env: HashMap::new(),
            time_provider,
            id_provider,
        }
    }

    /// Extra environment handed to every unit (notebook kernels and scripts)
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// `<archive>/<stem>__executed.ipynb`
    pub fn archive_path(&self, job: &Job) -> PathBuf {
        self.archive_dir
            .join(format!("{}{}.ipynb", job.stem(), EXECUTED_SUFFIX))
    }

    /// `<archive>/<stem>__capture.jsonl`
    pub fn capture_log_path(&self, job: &Job) -> PathBuf {
        self.archive_dir
            .join(format!("{}{}", job.stem(), CAPTURE_LOG_SUFFIX))
    }

    /// Execute one job, dispatching on the unit kind
    ///
    /// # Errors
    /// Setup failures (unreadable notebook, archive not writable, unsupported
    /// unit). A unit that runs and fails is reported in the returned
    /// `JobReport`, not as an error.
    pub async fn run(&self, job: &Job) -> Result<JobReport> {
        let kind = job.kind().ok_or_else(|| {
            AppError::Domain(DomainError::UnsupportedUnit(
                job.source_unit.display().to_string(),
            ))
        })?;

        let start = self.time_provider.now_millis();
        let mut report = JobReport::new(job.clone(), start);

        info!(unit = %job.source_unit.display(), kind = %kind, "Executing unit");

        match kind {
            UnitKind::Notebook => self.run_notebook(job, &mut report).await?,
            UnitKind::Script => self.run_script(job, &mut report).await?,
        }

        report.duration_ms = self.time_provider.now_millis() - start;
        info!(
            unit = %job.source_unit.display(),
            status = %report.status,
            duration_ms = report.duration_ms,
            moved = report.moved.len(),
            figures = report.figures_saved.len(),
            "Unit finished"
        );
        Ok(report)
    }

    async fn run_notebook(&self, job: &Job, report: &mut JobReport) -> Result<()> {
        let work_dir = job.work_dir();
        let before = self.snapshot(&work_dir).await?;
        let capture_log = self.prepare_capture_log(job)?;

        let mut document = NotebookDocument::load(&job.source_unit)?;
        let fragment = CaptureFragment::new(absolute(&job.output_dir)?)
            .naming(FigureNaming::TitleDerived)
            .in_work_dir(absolute(&work_dir)?)
            .with_manifest(absolute(&capture_log)?)
            .render();
        document.prepend_code_cell(&fragment, &self.id_provider.generate_id());

        // The engine is started inside `work_dir`, so a relative archive path
        // would resolve against the wrong directory
        let archived = absolute(&self.archive_path(job))?;
        document.save(&archived)?;

        let outcome = self
            .runner
            .execute_notebook(&NotebookRun {
                document: archived.clone(),
                work_dir: work_dir.clone(),
                env: self.env.clone(),
            })
            .await;

        let succeeded = record_outcome(report, outcome);
        if succeeded {
            report.archived_document = Some(archived);
        }
        self.harvest(job, &work_dir, before, &capture_log, report).await
    }

    async fn run_script(&self, job: &Job, report: &mut JobReport) -> Result<()> {
        let work_dir = job.work_dir();
        let before = self.snapshot(&work_dir).await?;
        let capture_log = self.prepare_capture_log(job)?;

        let script = absolute(&job.source_unit)?;
        let capture = CaptureFragment::new(absolute(&job.output_dir)?)
            .with_manifest(absolute(&capture_log)?);
        let driver = ScriptDriver::new(&script, capture).render();

        let mut env = self.env.clone();
        env.insert(PLOT_BACKEND_ENV.to_string(), PLOT_BACKEND.to_string());

        let outcome = self
            .runner
            .run_script(&ScriptRun {
                driver,
                script,
                work_dir: work_dir.clone(),
                env,
            })
            .await;

        record_outcome(report, outcome);
        self.harvest(job, &work_dir, before, &capture_log, report).await
    }

    fn prepare_capture_log(&self, job: &Job) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.archive_dir)
            .map_err(|e| AppError::io_at(&self.archive_dir, e))?;
        let path = self.capture_log_path(job);
        CaptureManifest::clear(&path)?;
        Ok(path)
    }

    /// Directory walk (and hashing in content mode) off the async workers
    async fn snapshot(&self, work_dir: &Path) -> Result<Snapshot> {
        let reconciler = self.reconciler.clone();
        let dir = work_dir.to_path_buf();
        let snapshot = tokio::task::spawn_blocking(move || {
            reconciler.snapshot(&dir, &ExtensionSet::tracked())
        })
        .await?;
        Ok(snapshot)
    }

    /// Reconcile images then tables, then fold in the capture log
    async fn harvest(
        &self,
        job: &Job,
        work_dir: &Path,
        before: Snapshot,
        capture_log: &Path,
        report: &mut JobReport,
    ) -> Result<()> {
        let reconciler = self.reconciler.clone();
        let source = work_dir.to_path_buf();
        let destination = job.output_dir.clone();
        let log = capture_log.to_path_buf();

        let (reconciled, manifest) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut reconciled = ReconcileReport::default();
            for class in ArtifactClass::ALL {
                reconciled.merge(reconciler.reconcile(
                    &source,
                    &destination,
                    &class.extension_set(),
                    &before,
                )?);
            }
            Ok((reconciled, CaptureManifest::read(&log)))
        })
        .await??;

        report.moved.extend(reconciled.moved);
        report.move_failures.extend(reconciled.failures);

        match manifest {
            Ok(manifest) => {
                if !manifest.failures.is_empty() {
                    warn!(
                        unit = %job.source_unit.display(),
                        failed = manifest.failures.len(),
                        "Some figures could not be saved"
                    );
                }
                report.figures_saved.extend(manifest.saved);
                report.save_failures.extend(manifest.failures);
            }
            Err(e) => warn!(path = %capture_log.display(), error = %e, "Capture log unreadable"),
        }
        Ok(())
    }
}

/// Fold the runner's answer into the report; returns true on success
fn record_outcome(
    report: &mut JobReport,
    outcome: std::result::Result<ExecutionResult, ExecutionError>,
) -> bool {
    match outcome {
        Ok(result) => {
            report.exit_code = result.exit_code;
            match result.status {
                ExecutionStatus::Success => true,
                ExecutionStatus::Failed => {
                    let code = result
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    let cause = match result.stderr_tail() {
                        Some(tail) => format!("exit code {code}: {tail}"),
                        None => format!("exit code {code}"),
                    };
                    warn!(unit = %report.job.source_unit.display(), cause = %cause, "Unit failed");
                    report.fail(cause);
                    false
                }
            }
        }
        Err(e) => {
            warn!(unit = %report.job.source_unit.display(), error = %e, "Unit could not be executed");
            report.fail(e.to_string());
            false
        }
    }
}

/// The injected code and the engines run with a different working directory,
/// so every path handed to them must be absolute
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
