// Capture manifest - what the injected hook reports back

use crate::domain::SaveFailure;
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One line written by the capture hook
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum CaptureEvent {
    Saved {
        figure: u32,
        path: PathBuf,
    },
    SaveFailed {
        figure: u32,
        #[serde(default)]
        path: Option<PathBuf>,
        error: String,
    },
}

/// Parsed capture log of one unit execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureManifest {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<SaveFailure>,
}

impl CaptureManifest {
    /// Read a JSON-lines capture log.
    ///
    /// A missing file means nothing was captured. Lines that do not parse
    /// (e.g. a write cut short by a crash) are skipped.
    pub fn read(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(AppError::io_at(path, e)),
        };
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut manifest = Self::default();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CaptureEvent>(line) {
                Ok(CaptureEvent::Saved { path, .. }) => manifest.saved.push(path),
                Ok(CaptureEvent::SaveFailed {
                    figure,
                    path,
                    error,
                }) => manifest.failures.push(SaveFailure {
                    figure,
                    path,
                    error,
                }),
                Err(e) => warn!(line = lineno + 1, error = %e, "Unparseable capture log line"),
            }
        }
        manifest
    }

    /// Remove a stale log left by a previous run
    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::io_at(path, e)),
        }
    }
}
