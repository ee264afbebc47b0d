use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduler runtime and the persistent error log.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{task} task join failure: {message}")]
    Join { task: String, message: String },

    #[error("ctrl-c handler failed: {0}")]
    Signal(String),
}

/// A cadence that cannot be evaluated. Never escapes the polling loop; the
/// job simply never fires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("repeating job has no INTERVAL")]
    MissingInterval,

    #[error("no REPEAT_{} value for interval '{}'", .interval.to_ascii_uppercase(), .interval)]
    MissingValue { interval: String },

    #[error("unknown interval '{0}'; expected: hour, day, week, month, year")]
    UnknownInterval(String),

    #[error("'{value}' does not match the {expected} format")]
    Malformed { value: String, expected: &'static str },

    #[error("{what} {value} is out of range")]
    OutOfRange { what: &'static str, value: u32 },

    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
