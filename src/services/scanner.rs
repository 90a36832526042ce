use crate::models::{FileMoveRecord, RuleSet};
use crate::services::classifier::classify_file;
use crate::services::mover::{CollisionSafeMover, MoveError};
use camino::{Utf8Path, Utf8PathBuf};
use std::io;

/// Outcome of one pass over the watched folder
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Completed moves, in the order they happened
    pub moved: Vec<FileMoveRecord>,
    /// Files left in place because no enabled rule matched
    pub unmatched: Vec<String>,
    /// Files that matched but could not be moved
    pub failed: Vec<(String, MoveError)>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty() && self.unmatched.is_empty() && self.failed.is_empty()
    }

    /// Number of candidate files seen at the root
    pub fn files_seen(&self) -> usize {
        self.moved.len() + self.unmatched.len() + self.failed.len()
    }

    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No files to organize".to_string();
        }

        let mut parts = vec![format!("Organized {} file(s)", self.moved.len())];
        if !self.unmatched.is_empty() {
            parts.push(format!("{} unmatched", self.unmatched.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        parts.join(", ")
    }
}

/// Immediate regular files of `root` that are candidates for organizing.
///
/// Directories, hidden entries, unreadable entries and names that are not
/// valid UTF-8 are skipped. Only failing to open `root` is an error.
/// The result is sorted so scans are deterministic.
pub fn list_candidates(root: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();

    for entry in root.as_std_path().read_dir()? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry in {}: {}", root, e);
                continue;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("Skipping non UTF-8 entry in {}", root);
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        // Follows symlinks, so links to directories are skipped too
        let is_file = match entry.path().metadata() {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                tracing::debug!("Skipping {}: {}", name, e);
                false
            }
        };
        if is_file {
            files.push(root.join(name));
        }
    }

    files.sort();
    Ok(files)
}

/// Classify and move every candidate at the root of `watched_root`.
///
/// A failed move is recorded and the scan carries on with the next file.
/// Only a failure to list the directory itself is returned as an error.
pub fn scan_directory(
    watched_root: &Utf8Path,
    rules: &RuleSet,
    mover: &CollisionSafeMover,
) -> io::Result<ScanReport> {
    let mut report = ScanReport::default();

    for path in list_candidates(watched_root)? {
        let Some(name) = path.file_name().map(str::to_string) else {
            continue;
        };

        let Some(rule) = classify_file(rules, &name) else {
            report.unmatched.push(name);
            continue;
        };

        match mover.move_file(&path, &rule.folder_name, watched_root) {
            Ok(record) => report.moved.push(record),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Failed to organize file");
                report.failed.push((name, e));
            }
        }
    }

    tracing::debug!(
        root = %watched_root,
        moved = report.moved.len(),
        unmatched = report.unmatched.len(),
        failed = report.failed.len(),
        "Scan finished"
    );
    Ok(report)
}
