//! Persistent record of per-job failures.
//!
//! One JSON object per line:
//!
//! ```text
//! {"timestamp":"2024-03-04T18:01:00+01:00","job":"budget","range":"Budget!A:H",
//!  "database_id":"db-budget","priority":"calculator","error":"sheet 'Budget' not found"}
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};

use sheetsync_core::{Priority, SyncJob};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};

/// One failed job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub job: String,
    pub range: String,
    pub database_id: String,
    pub priority: Priority,
    pub error: String,
}

impl ErrorEntry {
    pub fn for_job(job: &SyncJob, error: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            job: job.display_name().to_owned(),
            range: job.range.to_string(),
            database_id: job.database_id.to_string(),
            priority: job.priority,
            error: error.into(),
        }
    }
}

/// Destination for job failures. Recording never fails the caller.
pub trait ErrorSink: Send + Sync {
    fn record(&self, entry: &ErrorEntry);
}

/// Appends entries to a JSON-lines file, rotating it by size first.
#[derive(Debug)]
pub struct FileErrorSink {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    lock: Mutex<()>,
}

impl FileErrorSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: MAX_LOG_BYTES,
            keep: MAX_ROTATED_FILES,
            lock: Mutex::new(()),
        }
    }

    pub fn with_limits(mut self, max_bytes: u64, keep: usize) -> Self {
        self.max_bytes = max_bytes;
        self.keep = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ErrorEntry) -> Result<(), DaemonError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if rotate_if_needed(&self.path, self.max_bytes, self.keep)
            .map_err(|e| io_err(&self.path, e))?
        {
            tracing::info!(path = %self.path.display(), "error log rotated");
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(&self.path, e))
    }
}

impl ErrorSink for FileErrorSink {
    fn record(&self, entry: &ErrorEntry) {
        if let Err(err) = self.append(entry) {
            tracing::warn!(error = %err, "could not write to error log");
        }
    }
}
