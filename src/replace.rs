//! Backup-then-write replacement of an image file.
//!
//! The original is always moved into a sibling backup directory before the
//! new bytes are written to its path, so at every point either the original
//! or its backup exists on disk:
//!
//! ```text
//! photos/
//! ├── Backup/
//! │   └── IMG_0042.jpg    # original, moved here first
//! └── IMG_0042.jpg        # re-encoded result
//! ```
//!
//! An existing backup with the same name is never overwritten, even when two
//! jobs race on the same file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ReplaceError {
    #[error("{} has no parent directory or file name", .0.display())]
    InvalidPath(PathBuf),
    #[error("Failed to create backup directory {}: {source}", .path.display())]
    CreateBackupDir { path: PathBuf, source: io::Error },
    #[error("Backup already exists at {}; refusing to overwrite it", .0.display())]
    BackupExists(PathBuf),
    #[error("Failed to move original to {}: {source}", .path.display())]
    Backup { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Where the backup of `path` would be placed.
pub fn backup_path(path: &Path, backup_dir_name: &str) -> Result<PathBuf, ReplaceError> {
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(ReplaceError::InvalidPath(path.to_path_buf()));
    };
    Ok(parent.join(backup_dir_name).join(file_name))
}

/// Move `from` to `to`, failing with `AlreadyExists` if `to` is present.
///
/// The backup is created with a hard link, or an exclusive copy where links
/// are not possible (e.g. across filesystems), so a concurrent job can never
/// replace a backup that is already on disk.
fn move_exclusive(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(link_err) => {
            debug!(error = %link_err, "hard link failed, copying instead");
            copy_exclusive(from, to)?;
        }
    }
    // The original path must be unlinked before new bytes go there, or the
    // write would land in the backup too
    if let Err(e) = fs::remove_file(from) {
        fs::remove_file(to).ok();
        return Err(e);
    }
    Ok(())
}

fn copy_exclusive(from: &Path, to: &Path) -> io::Result<()> {
    let mut src = File::open(from)?;
    let mut dst = OpenOptions::new().write(true).create_new(true).open(to)?;
    if let Err(e) = io::copy(&mut src, &mut dst).and_then(|_| dst.sync_all()) {
        drop(dst);
        fs::remove_file(to).ok();
        return Err(e);
    }
    Ok(())
}

/// Back up the file at `path` into `<parent>/<backup_dir_name>/` and write
/// `bytes` in its place. Returns the backup path.
///
/// If the write fails the backup is moved back to `path`.
pub fn backup_and_write(
    path: &Path,
    bytes: &[u8],
    backup_dir_name: &str,
) -> Result<PathBuf, ReplaceError> {
    backup_and_write_with(path, backup_dir_name, |p| fs::write(p, bytes))
}

fn backup_and_write_with(
    path: &Path,
    backup_dir_name: &str,
    write: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<PathBuf, ReplaceError> {
    let backup = backup_path(path, backup_dir_name)?;
    let Some(backup_dir) = backup.parent() else {
        return Err(ReplaceError::InvalidPath(path.to_path_buf()));
    };

    fs::create_dir_all(backup_dir).map_err(|source| ReplaceError::CreateBackupDir {
        path: backup_dir.to_path_buf(),
        source,
    })?;

    move_exclusive(path, &backup).map_err(|source| {
        if source.kind() == io::ErrorKind::AlreadyExists {
            ReplaceError::BackupExists(backup.clone())
        } else {
            ReplaceError::Backup {
                path: backup.clone(),
                source,
            }
        }
    })?;

    if let Err(source) = write(path) {
        if let Err(e) = fs::rename(&backup, path) {
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "write failed and the original could not be restored; it remains in the backup"
            );
        }
        return Err(ReplaceError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), backup = %backup.display(), "replaced");
    Ok(backup)
}
