//! Input selection.
//!
//! Decides which files a run works on:
//!
//! - **Explicit files**: every argument whose extension is supported, in the
//!   order given. Arguments with other extensions are skipped with a warning.
//! - **Directory scan**: without explicit files, every regular file directly
//!   inside the directory (non-recursive) whose extension is supported,
//!   sorted by path.
//!
//! Extension matching is case-insensitive (`IMG_0042.JPG` matches `jpg`).
//! A file named more than once (`a.jpg ./a.jpg`) is processed once.
//! Hidden files and the backup directory are never picked up by a scan.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Whether `path` has one of `extensions` (case-insensitive).
pub fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy();
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Select the files to process.
///
/// When `files` is non-empty it is filtered by extension and returned in the
/// given order, keeping only the first mention of each file; `dir` is not
/// read. Otherwise `dir` is scanned.
pub fn select_inputs(
    files: &[PathBuf],
    dir: &Path,
    extensions: &[String],
) -> Result<Vec<PathBuf>, ScanError> {
    if !files.is_empty() {
        let mut seen = HashSet::new();
        return Ok(files
            .iter()
            .filter(|p| {
                if !has_supported_extension(p, extensions) {
                    warn!(path = %p.display(), "skipping file with unsupported extension");
                    return false;
                }
                // Paths that cannot be resolved (missing files) compare as given
                let key = fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
                if !seen.insert(key) {
                    warn!(path = %p.display(), "skipping duplicate file");
                    return false;
                }
                true
            })
            .cloned()
            .collect());
    }
    scan_directory(dir, extensions)
}

fn scan_directory(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    let read_dir = fs::read_dir(dir).map_err(|source| ScanError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries: Vec<PathBuf> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let hidden = p
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            !hidden && p.is_file() && has_supported_extension(p, extensions)
        })
        .collect();

    entries.sort();
    Ok(entries)
}
