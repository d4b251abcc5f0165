// Job Domain Model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of analysis unit, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    Notebook,
    Script,
}

impl UnitKind {
    /// Classify a unit path by extension (case-insensitive).
    /// Returns None for anything that is neither `.ipynb` nor `.py`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ipynb" => Some(UnitKind::Notebook),
            "py" => Some(UnitKind::Script),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Notebook => write!(f, "NOTEBOOK"),
            UnitKind::Script => write!(f, "SCRIPT"),
        }
    }
}

/// One pipeline step: run `source_unit`, harvest its artifacts into `output_dir`.
///
/// Jobs are defined once at startup and executed in order; later stages may
/// read files that earlier stages left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub source_unit: PathBuf,
    pub output_dir: PathBuf,
}

impl Job {
    pub fn new(source_unit: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_unit: source_unit.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn kind(&self) -> Option<UnitKind> {
        UnitKind::from_path(&self.source_unit)
    }

    /// Directory the unit runs in (its own parent directory)
    pub fn work_dir(&self) -> PathBuf {
        match self.source_unit.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// File name of the unit, for progress lines
    pub fn display_name(&self) -> String {
        self.source_unit
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_unit.display().to_string())
    }

    /// Base name without extension, used to name archived documents
    pub fn stem(&self) -> String {
        self.source_unit
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string())
    }
}
