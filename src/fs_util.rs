//! Directory helpers shared by the pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Fail with [`Error::MissingDirectory`] unless `path` is an existing directory.
pub fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::MissingDirectory(path.to_path_buf()))
    }
}

/// Delete every regular file directly inside `dir` and return how many were removed.
///
/// Subdirectories are left alone.
pub fn clear_dir(dir: &Path) -> Result<usize> {
    require_dir(dir)?;

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            tracing::warn!(path = %path.display(), "leaving subdirectory in output directory");
            continue;
        }
        fs::remove_file(&path)?;
        removed += 1;
    }

    tracing::debug!(dir = %dir.display(), removed, "cleared directory");
    Ok(removed)
}

/// Regular files directly inside `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    require_dir(dir)?;

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
