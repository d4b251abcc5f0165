// File Reconciler - snapshot a working directory, then relocate what a job produced

use crate::domain::{
    ArtifactClass, ChangeDetection, ExtensionSet, FileStamp, MoveFailure, MovedArtifact,
    ProtectedPaths, Snapshot,
};
use crate::error::{AppError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What one reconcile pass did
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub moved: Vec<MovedArtifact>,
    pub failures: Vec<MoveFailure>,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.moved.extend(other.moved);
        self.failures.extend(other.failures);
    }
}

/// Snapshot/diff/move engine
///
/// Only direct entries of a directory are considered; nothing is recursed into.
/// Files under a protected directory are invisible to both `snapshot` and
/// `reconcile`, whatever their timestamps.
#[derive(Debug, Clone, Default)]
pub struct FileReconciler {
    protected: ProtectedPaths,
    detection: ChangeDetection,
}

impl FileReconciler {
    pub fn new(protected: ProtectedPaths, detection: ChangeDetection) -> Self {
        Self {
            protected,
            detection,
        }
    }

    /// Record every tracked file directly inside `directory`.
    ///
    /// A missing or unreadable directory yields an empty snapshot.
    pub fn snapshot(&self, directory: &Path, extensions: &ExtensionSet) -> Snapshot {
        let mut snapshot = Snapshot::default();
        if self.protected.contains(directory) {
            debug!(dir = %directory.display(), "Snapshot skipped: directory is protected");
            return snapshot;
        }

        for path in self.candidates(directory, extensions) {
            match FileStamp::read(&path, self.detection) {
                Ok(stamp) => snapshot.insert(path, stamp),
                Err(e) => debug!(path = %path.display(), error = %e, "Unreadable entry skipped"),
            }
        }

        debug!(
            dir = %directory.display(),
            files = snapshot.len(),
            "Directory snapshot captured"
        );
        snapshot
    }

    /// Move every file that is new or updated relative to `before` from
    /// `source_dir` into `dest_dir`.
    ///
    /// Name collisions in `dest_dir` get a `_<n>` suffix before the extension.
    /// A failed move leaves the file in place and is reported, not raised.
    ///
    /// # Errors
    /// Only if `dest_dir` cannot be created.
    pub fn reconcile(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        extensions: &ExtensionSet,
        before: &Snapshot,
    ) -> Result<ReconcileReport> {
        fs::create_dir_all(dest_dir).map_err(|e| AppError::io_at(dest_dir, e))?;

        let mut report = ReconcileReport::default();
        if !source_dir.is_dir() {
            return Ok(report);
        }
        if self.protected.contains(source_dir) {
            warn!(dir = %source_dir.display(), "Refusing to reconcile a protected directory");
            return Ok(report);
        }
        if same_dir(source_dir, dest_dir) {
            debug!(dir = %source_dir.display(), "Source and destination coincide, nothing to move");
            return Ok(report);
        }

        for path in self.candidates(source_dir, extensions) {
            let stamp = match FileStamp::read(&path, self.detection) {
                Ok(stamp) => stamp,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Entry vanished before reconcile");
                    continue;
                }
            };
            if !stamp.is_artifact(before.get(&path), self.detection) {
                continue;
            }

            let Some(name) = path.file_name() else {
                continue;
            };
            let destination = free_destination(dest_dir, Path::new(name));
            match move_file(&path, &destination) {
                Ok(()) => {
                    debug!(
                        from = %path.display(),
                        to = %destination.display(),
                        "Artifact relocated"
                    );
                    report.moved.push(MovedArtifact {
                        class: ArtifactClass::of(&path),
                        source: path,
                        destination,
                    });
                }
                Err(e) => {
                    warn!(
                        from = %path.display(),
                        to = %destination.display(),
                        error = %e,
                        "Artifact move failed, left in place"
                    );
                    report.failures.push(MoveFailure {
                        source: path,
                        destination,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.moved.is_empty() || !report.failures.is_empty() {
            info!(
                source = %source_dir.display(),
                dest = %dest_dir.display(),
                moved = report.moved.len(),
                failed = report.failures.len(),
                "Reconciliation finished"
            );
        }
        Ok(report)
    }

    /// Direct regular files of `directory` matching `extensions`, outside
    /// protected paths, in name order
    fn candidates(&self, directory: &Path, extensions: &ExtensionSet) -> Vec<PathBuf> {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %directory.display(), error = %e, "Cannot list directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| extensions.matches(p))
            .filter(|p| !self.protected.contains(p))
            .collect();
        paths.sort();
        paths
    }
}

/// First free path for `name` inside `dir`: `name`, then `stem_1.ext`, `stem_2.ext`, ...
pub fn free_destination(dir: &Path, name: &Path) -> PathBuf {
    let candidate = dir.join(name);
    if !occupied(&candidate) {
        return candidate;
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let file_name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(file_name);
        if !occupied(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Rename, falling back to copy + remove when the rename is refused
/// (e.g. across filesystems). The source never survives a successful move.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if fs::copy(from, to).is_err() {
        return Err(rename_err);
    }
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    /// Push a file's mtime forward so timestamp comparisons do not depend on
    /// filesystem clock granularity
    fn touch_later(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn tables() -> ExtensionSet {
        ArtifactClass::Table.extension_set()
    }

    #[test]
    fn test_snapshot_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = FileReconciler::default();
        let snap = reconciler.snapshot(&dir.path().join("nope"), &ExtensionSet::tracked());
        assert!(snap.is_empty());
    }

    #[test]
    fn test_snapshot_is_flat_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.csv"), "1");
        write(&dir.path().join("b.JPG"), "2");
        write(&dir.path().join("notes.txt"), "3");
        fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested").join("c.csv"), "4");

        let snap = FileReconciler::default().snapshot(dir.path(), &ExtensionSet::tracked());
        let names: Vec<_> = snap
            .paths()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.JPG"]);
    }

    #[test]
    fn test_new_and_updated_files_move() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("Scripts");
        let out = dir.path().join("KPI");
        fs::create_dir(&work).unwrap();
        write(&work.join("a.csv"), "old");

        let reconciler = FileReconciler::default();
        let before = reconciler.snapshot(&work, &ExtensionSet::tracked());

        write(&work.join("a.csv"), "new");
        touch_later(&work.join("a.csv"), 5);
        write(&work.join("b.csv"), "fresh");

        let report = reconciler.reconcile(&work, &out, &tables(), &before).unwrap();
        assert_eq!(report.moved.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(fs::read_to_string(out.join("a.csv")).unwrap(), "new");
        assert_eq!(fs::read_to_string(out.join("b.csv")).unwrap(), "fresh");
        assert!(!work.join("a.csv").exists());
        assert!(!work.join("b.csv").exists());
        assert_eq!(report.moved[0].class, Some(ArtifactClass::Table));
    }

    #[test]
    fn test_untouched_file_never_moves() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        let out = dir.path().join("o");
        fs::create_dir(&work).unwrap();
        write(&work.join("input.csv"), "keep me");

        let reconciler = FileReconciler::default();
        let before = reconciler.snapshot(&work, &ExtensionSet::tracked());
        let report = reconciler.reconcile(&work, &out, &tables(), &before).unwrap();

        assert!(report.moved.is_empty());
        assert!(work.join("input.csv").exists());
        assert!(out.is_dir(), "destination is created even when nothing moves");
    }

    #[test]
    fn test_only_requested_extensions_move() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        let out = dir.path().join("o");
        fs::create_dir(&work).unwrap();

        let reconciler = FileReconciler::default();
        let before = reconciler.snapshot(&work, &ExtensionSet::tracked());
        write(&work.join("chart.jpg"), "img");
        write(&work.join("t.csv"), "tab");

        let images = ArtifactClass::Image.extension_set();
        let report = reconciler.reconcile(&work, &out, &images, &before).unwrap();
        assert_eq!(report.moved.len(), 1);
        assert!(out.join("chart.jpg").exists());
        assert!(work.join("t.csv").exists());
    }

    #[test]
    fn test_collisions_get_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("o");
        fs::create_dir(&out).unwrap();
        write(&out.join("report.csv"), "0");
        write(&out.join("report_1.csv"), "1");

        let reconciler = FileReconciler::default();
        for (i, content) in ["2", "3"].iter().enumerate() {
            let work = dir.path().join(format!("w{i}"));
            fs::create_dir(&work).unwrap();
            let before = reconciler.snapshot(&work, &ExtensionSet::tracked());
            write(&work.join("report.csv"), content);
            reconciler.reconcile(&work, &out, &tables(), &before).unwrap();
        }

        assert_eq!(fs::read_to_string(out.join("report.csv")).unwrap(), "0");
        assert_eq!(fs::read_to_string(out.join("report_1.csv")).unwrap(), "1");
        assert_eq!(fs::read_to_string(out.join("report_2.csv")).unwrap(), "2");
        assert_eq!(fs::read_to_string(out.join("report_3.csv")).unwrap(), "3");
    }

    #[test]
    fn test_free_destination_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("data"), "x");
        assert_eq!(
            free_destination(dir.path(), Path::new("data")),
            dir.path().join("data_1")
        );
    }

    #[test]
    fn test_protected_directory_is_never_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("Data");
        let out = dir.path().join("o");
        fs::create_dir(&data).unwrap();
        write(&data.join("raw.csv"), "raw");

        let reconciler = FileReconciler::new(ProtectedPaths::new([&data]), ChangeDetection::Timestamp);
        let before = reconciler.snapshot(&data, &ExtensionSet::tracked());
        assert!(before.is_empty());

        write(&data.join("raw.csv"), "raw v2");
        touch_later(&data.join("raw.csv"), 5);
        write(&data.join("derived.csv"), "new");

        let report = reconciler.reconcile(&data, &out, &tables(), &before).unwrap();
        assert!(report.moved.is_empty());
        assert!(data.join("raw.csv").exists());
        assert!(data.join("derived.csv").exists());
    }

    #[test]
    fn test_same_source_and_destination_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = FileReconciler::default();
        let before = reconciler.snapshot(dir.path(), &ExtensionSet::tracked());
        write(&dir.path().join("a.csv"), "a");

        let report = reconciler
            .reconcile(dir.path(), dir.path(), &tables(), &before)
            .unwrap();
        assert!(report.moved.is_empty());
        assert!(dir.path().join("a.csv").exists());
        assert!(!dir.path().join("a_1.csv").exists());
    }

    #[test]
    fn test_content_detection_moves_same_mtime_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        let out = dir.path().join("o");
        fs::create_dir(&work).unwrap();
        let path = work.join("a.csv");
        write(&path, "v1");
        let pinned = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(pinned)
            .unwrap();

        let reconciler = FileReconciler::new(ProtectedPaths::none(), ChangeDetection::Content);
        let before = reconciler.snapshot(&work, &ExtensionSet::tracked());

        write(&path, "v2");
        fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(pinned)
            .unwrap();

        let report = reconciler.reconcile(&work, &out, &tables(), &before).unwrap();
        assert_eq!(report.moved.len(), 1);
        assert_eq!(fs::read_to_string(out.join("a.csv")).unwrap(), "v2");
    }

    #[cfg(unix)]
    #[test]
    fn test_move_failure_is_reported_not_raised() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        let out = dir.path().join("o");
        fs::create_dir(&work).unwrap();
        fs::create_dir(&out).unwrap();

        let reconciler = FileReconciler::default();
        let before = reconciler.snapshot(&work, &ExtensionSet::tracked());
        write(&work.join("a.csv"), "a");

        // Read-only destination: rename and copy both fail
        fs::set_permissions(&out, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(out.join("writable"), "").is_ok() {
            // Running as root: permissions are not enforced, nothing to test
            fs::set_permissions(&out, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = reconciler.reconcile(&work, &out, &tables(), &before).unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(report.moved.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(work.join("a.csv").exists());
    }
}
