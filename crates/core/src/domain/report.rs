// Per-job and per-run outcome reports

use super::artifact::ArtifactClass;
use super::job::{Job, UnitKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An artifact relocated from the working directory to a stage folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedArtifact {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<ArtifactClass>,
}

/// An artifact that could not be relocated; it stays where it was
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

/// A figure the capture hook failed to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFailure {
    pub figure: u32,
    pub path: Option<PathBuf>,
    pub error: String,
}

/// Why a job was not executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingInput,
    UnsupportedType,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingInput => write!(f, "missing input"),
            SkipReason::UnsupportedType => write!(f, "unsupported type"),
        }
    }
}

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Succeeded,
    Skipped { reason: SkipReason },
    Failed { cause: String },
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Skipped { .. } => write!(f, "SKIPPED"),
            JobStatus::Failed { .. } => write!(f, "FAILED"),
        }
    }
}

/// Everything that happened to one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: Job,
    pub kind: Option<UnitKind>,
    pub status: JobStatus,

    pub started_at: i64, // epoch ms
    pub duration_ms: i64,
    pub exit_code: Option<i32>,

    pub archived_document: Option<PathBuf>,
    pub figures_saved: Vec<PathBuf>,
    pub save_failures: Vec<SaveFailure>,
    pub moved: Vec<MovedArtifact>,
    pub move_failures: Vec<MoveFailure>,
}

impl JobReport {
    pub fn new(job: Job, started_at: i64) -> Self {
        let kind = job.kind();
        Self {
            job,
            kind,
            status: JobStatus::Succeeded,
            started_at,
            duration_ms: 0,
            exit_code: None,
            archived_document: None,
            figures_saved: Vec::new(),
            save_failures: Vec::new(),
            moved: Vec::new(),
            move_failures: Vec::new(),
        }
    }

    pub fn skipped(job: Job, started_at: i64, reason: SkipReason) -> Self {
        let mut report = Self::new(job, started_at);
        report.status = JobStatus::Skipped { reason };
        report
    }

    pub fn fail(&mut self, cause: impl Into<String>) {
        self.status = JobStatus::Failed {
            cause: cause.into(),
        };
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, JobStatus::Failed { .. })
    }

    /// Job failed, or some artifact was lost along the way
    pub fn has_problems(&self) -> bool {
        self.is_failed() || !self.save_failures.is_empty() || !self.move_failures.is_empty()
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: i64, // epoch ms
    pub finished_at: Option<i64>,
    pub jobs: Vec<JobReport>,
}

impl PipelineReport {
    pub fn new(run_id: impl Into<String>, started_at: i64) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: None,
            jobs: Vec::new(),
        }
    }

    /// True if any job failed or any figure/artifact could not be saved or moved
    pub fn has_failures(&self) -> bool {
        self.jobs.iter().any(JobReport::has_problems)
    }

    pub fn count(&self, pred: impl Fn(&JobStatus) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Failed { .. }))
    }

    pub fn artifacts_moved(&self) -> usize {
        self.jobs.iter().map(|j| j.moved.len()).sum()
    }

    pub fn figures_saved(&self) -> usize {
        self.jobs.iter().map(|j| j.figures_saved.len()).sum()
    }
}
