// Directory snapshot model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How the reconciler decides that a file changed during a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// New file, or modification time strictly greater than recorded
    #[default]
    Timestamp,
    /// Timestamp rule, plus any file whose content fingerprint changed
    /// (catches rewrites inside the filesystem clock granularity)
    Content,
}

impl std::str::FromStr for ChangeDetection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" | "mtime" => Ok(ChangeDetection::Timestamp),
            "content" | "hash" => Ok(ChangeDetection::Content),
            other => Err(format!("unknown change detection mode: {other}")),
        }
    }
}

/// blake3 digest of a file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Hash a file in fixed-size chunks
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut hasher = blake3::Hasher::new();

        let mut buffer = [0u8; 8192];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self(hasher.finalize()))
    }
}

/// Recorded state of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub fingerprint: Option<Fingerprint>,
}

impl FileStamp {
    pub fn new(modified: SystemTime) -> Self {
        Self {
            modified,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Read the stamp of `path`, hashing content only in `Content` mode
    pub fn read(path: &Path, detection: ChangeDetection) -> io::Result<Self> {
        let modified = path.metadata()?.modified()?;
        let stamp = Self::new(modified);
        match detection {
            ChangeDetection::Timestamp => Ok(stamp),
            ChangeDetection::Content => Ok(stamp.with_fingerprint(Fingerprint::from_file(path)?)),
        }
    }

    /// Whether a file with this current stamp counts as an artifact
    /// relative to what the snapshot recorded (`None` = not recorded).
    pub fn is_artifact(&self, before: Option<&FileStamp>, detection: ChangeDetection) -> bool {
        let Some(before) = before else {
            return true;
        };
        if self.modified > before.modified {
            return true;
        }
        match detection {
            ChangeDetection::Timestamp => false,
            ChangeDetection::Content => match (&self.fingerprint, &before.fingerprint) {
                (Some(now), Some(then)) => now != then,
                _ => false,
            },
        }
    }
}

/// Point-in-time record of one directory's tracked files
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, FileStamp>,
}

impl Snapshot {
    pub fn insert(&mut self, path: PathBuf, stamp: FileStamp) {
        self.entries.insert(path, stamp);
    }

    pub fn get(&self, path: &Path) -> Option<&FileStamp> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}
