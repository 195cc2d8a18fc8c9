//! Numbered copies of the audio outputs for the playback device.
//!
//! The device plays files by index, so every output is copied as `NNNN_<name>`
//! (four digits, starting at `0001`) in file-name order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::fs_util::{clear_dir, list_files};

pub fn numbered_name(index: usize, name: &str) -> String {
    format!("{index:04}_{name}")
}

/// Replace the contents of `device_dir` with numbered copies of every file in `source_dir`.
///
/// Returns the written paths in numbering order.
pub fn export_for_device(source_dir: &Path, device_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(device_dir)?;
    clear_dir(device_dir)?;

    let mut written = Vec::new();
    for (i, src) in list_files(source_dir)?.into_iter().enumerate() {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dest = device_dir.join(numbered_name(i + 1, &name.to_string_lossy()));
        fs::copy(&src, &dest)?;
        written.push(dest);
    }

    tracing::info!(
        count = written.len(),
        dir = %device_dir.display(),
        "exported files for device"
    );
    Ok(written)
}
