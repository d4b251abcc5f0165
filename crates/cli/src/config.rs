//! Job table and directory layout
//!
//! The built-in table reproduces the analysis project's stage layout. A JSON
//! file (`--config` / `HARVEST_CONFIG`) can replace it; every relative path in
//! it is resolved against the base directory.

use anyhow::{bail, Context, Result};
use harvest_core::domain::Job;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_UNITS_DIR: &str = "Scripts";
pub const DEFAULT_ARCHIVE_DIR: &str = "executed_notebooks";
pub const DEFAULT_PROTECTED_DIR: &str = "Data";

/// One row of the job table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    /// Unit file, relative to `units_dir`
    pub unit: PathBuf,
    /// Stage folder, relative to the base directory
    pub output: PathBuf,
}

impl JobEntry {
    fn new(unit: &str, output: &str) -> Self {
        Self {
            unit: PathBuf::from(unit),
            output: PathBuf::from(output),
        }
    }
}

/// Pipeline layout as loaded from JSON (or the built-in default)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineLayout {
    pub units_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub protected_dirs: Vec<PathBuf>,
    pub jobs: Vec<JobEntry>,
}

impl Default for PipelineLayout {
    fn default() -> Self {
        Self {
            units_dir: PathBuf::from(DEFAULT_UNITS_DIR),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            protected_dirs: vec![PathBuf::from(DEFAULT_PROTECTED_DIR)],
            jobs: vec![
                JobEntry::new("Cleaning.ipynb", "Data"),
                JobEntry::new("KPI_mine.ipynb", "KPI"),
                JobEntry::new("RecentKPIs.ipynb", "KPI"),
                JobEntry::new("segmentation.ipynb", "Segmentation"),
                JobEntry::new("Partie 4 - prediction_model udapted.ipynb", "Prédiction"),
                JobEntry::new("Analyse exploratoire.ipynb", "Prédiction"),
            ],
        }
    }
}

impl PipelineLayout {
    /// Load a layout file, or the built-in table when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let layout = Self::from_json(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(layout)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let layout: Self = serde_json::from_str(raw)?;
        if layout.jobs.is_empty() {
            bail!("job table is empty");
        }
        Ok(layout)
    }

    /// Resolved layout rooted at `base`
    pub fn resolve(&self, base: &Path) -> ResolvedLayout {
        let units = base.join(&self.units_dir);
        ResolvedLayout {
            archive_dir: base.join(&self.archive_dir),
            protected_dirs: self.protected_dirs.iter().map(|d| base.join(d)).collect(),
            jobs: self
                .jobs
                .iter()
                .map(|entry| Job::new(units.join(&entry.unit), base.join(&entry.output)))
                .collect(),
        }
    }
}

/// Absolute-ish paths ready for the executor
#[derive(Debug, Clone)]
pub struct ResolvedLayout {
    pub archive_dir: PathBuf,
    pub protected_dirs: Vec<PathBuf>,
    pub jobs: Vec<Job>,
}

impl ResolvedLayout {
    /// Distinct stage folders, in first-use order
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.jobs
            .iter()
            .filter(|job| seen.insert(job.output_dir.clone()))
            .map(|job| job.output_dir.clone())
            .collect()
    }

    /// Create the archive and every stage folder
    pub fn bootstrap(&self) -> Result<()> {
        std::iter::once(&self.archive_dir)
            .chain(self.output_dirs().iter())
            .try_for_each(|dir| {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))
            })
    }
}

/// Expand `~` and make the base directory absolute
pub fn resolve_base_dir(raw: &str) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    let absolute = std::path::absolute(&expanded)
        .with_context(|| format!("Cannot resolve base directory {raw}"))?;
    if !absolute.is_dir() {
        bail!("base directory {} does not exist", absolute.display());
    }
    Ok(absolute)
}
