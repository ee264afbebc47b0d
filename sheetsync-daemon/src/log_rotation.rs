//! Size-based rotation for the persistent error log.
//!
//! `sync_errors.log` is shifted to `sync_errors.log.1` once it reaches
//! [`MAX_LOG_BYTES`]; older copies move up one slot and anything past
//! [`MAX_ROTATED_FILES`] is deleted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` when it is at least `max_bytes` long.
///
/// Returns `Ok(false)` when the file is smaller or does not exist. The live
/// path is left absent after a rotation; the next append recreates it.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, keep: usize) -> io::Result<bool> {
    let len = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if len < max_bytes || keep == 0 {
        return Ok(false);
    }

    remove_if_present(&rotated_path(log_path, keep))?;
    for slot in (1..keep).rev() {
        let from = rotated_path(log_path, slot);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, slot + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))?;
    Ok(true)
}

/// Path of the `slot`-th rotated copy, e.g. `sync_errors.log.2`.
pub fn rotated_path(base: &Path, slot: usize) -> PathBuf {
    let mut name = base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{slot}"));
    base.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
