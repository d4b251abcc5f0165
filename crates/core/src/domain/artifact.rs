// Artifact classes and protected paths

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// The two tracked artifact classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    /// Chart images
    Image,
    /// Tabular exports
    Table,
}

impl ArtifactClass {
    pub const ALL: [ArtifactClass; 2] = [ArtifactClass::Image, ArtifactClass::Table];

    /// Extensions (lowercase, no dot) belonging to this class
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ArtifactClass::Image => &["jpg"],
            ArtifactClass::Table => &["csv"],
        }
    }

    pub fn extension_set(&self) -> ExtensionSet {
        ExtensionSet::for_classes(&[*self])
    }

    /// Classify a path, if it belongs to a tracked class
    pub fn of(path: &Path) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.extension_set().matches(path))
    }
}

impl std::fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactClass::Image => write!(f, "image"),
            ArtifactClass::Table => write!(f, "table"),
        }
    }
}

/// Case-insensitive set of file extensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn for_classes(classes: &[ArtifactClass]) -> Self {
        Self(
            classes
                .iter()
                .flat_map(|c| c.extensions().iter())
                .map(|e| e.to_string())
                .collect(),
        )
    }

    /// All tracked classes (images and tables)
    pub fn tracked() -> Self {
        Self::for_classes(&ArtifactClass::ALL)
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.0.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

}

/// Directories whose contents are never snapshotted nor relocated
#[derive(Debug, Clone, Default)]
pub struct ProtectedPaths {
    roots: Vec<PathBuf>,
}

impl ProtectedPaths {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut roots = Vec::new();
        for dir in dirs {
            let dir = dir.as_ref();
            roots.push(lexical_normalize(dir));
            if let Ok(canonical) = dir.canonicalize() {
                roots.push(canonical);
            }
        }
        roots.sort();
        roots.dedup();
        Self { roots }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// True iff `path` equals or lies beneath a protected directory
    pub fn contains(&self, path: &Path) -> bool {
        if self.roots.is_empty() {
            return false;
        }
        let lexical = lexical_normalize(path);
        if self.roots.iter().any(|root| lexical.starts_with(root)) {
            return true;
        }
        // Resolve through the parent so a file that is being moved away
        // (or a dangling symlink) still compares on its real location.
        let canonical = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
                .canonicalize()
                .ok()
                .map(|p| p.join(name)),
            _ => path.canonicalize().ok(),
        };
        canonical
            .map(|c| self.roots.iter().any(|root| c.starts_with(root)))
            .unwrap_or(false)
    }
}

/// Drop `.` components and fold `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
