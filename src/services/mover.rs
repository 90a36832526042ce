use crate::models::{FileMoveRecord, validate_folder_name};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// Errors that can occur while relocating a single file.
///
/// None of these abort a scan; the file is skipped and retried on the next one.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Invalid destination folder name '{0}'")]
    InvalidFolderName(String),

    #[error("Source file {0} is missing or not a regular file")]
    SourceMissing(Utf8PathBuf),

    #[error("Failed to create folder {path}: {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MoveError {
    /// I/O failures may succeed on a later scan; bad folder names will not
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MoveError::InvalidFolderName(_))
    }
}

/// Performs the create-folder, pick-unique-name, rename sequence.
///
/// Existing entries at the destination are never overwritten: a taken
/// `name.ext` becomes `name_1.ext`, then `name_2.ext`, and so on.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionSafeMover;

impl CollisionSafeMover {
    pub fn new() -> Self {
        Self
    }

    /// Move `file` into `watched_root/folder_name`
    pub fn move_file(
        &self,
        file: &Utf8Path,
        folder_name: &str,
        watched_root: &Utf8Path,
    ) -> Result<FileMoveRecord, MoveError> {
        validate_folder_name(folder_name)
            .map_err(|_| MoveError::InvalidFolderName(folder_name.to_string()))?;

        let file_name = file
            .file_name()
            .ok_or_else(|| MoveError::SourceMissing(file.to_path_buf()))?;

        match fs::symlink_metadata(file) {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(MoveError::SourceMissing(file.to_path_buf())),
        }

        let destination_dir = watched_root.join(folder_name.trim());
        fs::create_dir_all(&destination_dir).map_err(|source| MoveError::CreateDirectory {
            path: destination_dir.clone(),
            source,
        })?;

        let destination = place_without_overwrite(file, &destination_dir, file_name)?;

        let from_dir = file
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| watched_root.to_path_buf());

        tracing::info!(file = %file_name, to = %destination, "Moved file");
        Ok(FileMoveRecord::new(file_name, from_dir, destination))
    }
}

/// Attempts at claiming a free name before giving up on a contended folder
const MAX_PLACE_ATTEMPTS: u32 = 16;

/// Link `file` under the first free name in `dir`, then unlink the source.
///
/// `hard_link` fails with `AlreadyExists` instead of replacing an entry that
/// appeared after the free-name check, in which case the next name is tried.
/// Filesystems without hard links fall back to a plain rename.
fn place_without_overwrite(
    file: &Utf8Path,
    dir: &Utf8Path,
    file_name: &str,
) -> Result<Utf8PathBuf, MoveError> {
    let rename_err = |to: &Utf8Path, source: io::Error| MoveError::Rename {
        from: file.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let mut attempt = 0;
    loop {
        let destination = unique_destination(dir, file_name);
        match fs::hard_link(file, &destination) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(file) {
                    // Leave the source where it was rather than keep two copies
                    let _ = fs::remove_file(&destination);
                    return Err(rename_err(&destination, e));
                }
                return Ok(destination);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_PLACE_ATTEMPTS => {
                tracing::debug!(%destination, "Destination claimed concurrently, retrying");
                attempt += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MoveError::SourceMissing(file.to_path_buf()));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(rename_err(&destination, e));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Hard link unavailable, renaming instead");
                fs::rename(file, &destination).map_err(|source| rename_err(&destination, source))?;
                return Ok(destination);
            }
        }
    }
}

/// First free path in `dir` for `file_name`, suffixing `_<n>` before the extension
pub fn unique_destination(dir: &Utf8Path, file_name: &str) -> Utf8PathBuf {
    let candidate = dir.join(file_name);
    if !entry_exists(&candidate) {
        return candidate;
    }

    let (stem, ext) = split_name(file_name);
    let mut counter: u64 = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = dir.join(name);
        if !entry_exists(&candidate) {
            tracing::debug!(%candidate, collisions = counter, "Resolved name collision");
            return candidate;
        }
        counter += 1;
    }
}

/// Any entry counts as taken, including dangling symlinks
fn entry_exists(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}
