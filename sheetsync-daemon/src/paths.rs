use std::path::{Path, PathBuf};
use std::time::Duration;

/// Poll interval of the scheduler loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub const ERROR_LOG_FILE: &str = "sync_errors.log";

pub fn sheetsync_root(home: &Path) -> PathBuf {
    home.join(".sheetsync")
}

pub fn logs_dir(home: &Path) -> PathBuf {
    sheetsync_root(home).join("logs")
}

pub fn error_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(ERROR_LOG_FILE)
}
