//! Scheduler runtime: one-shot and repeating sync jobs, plus the persistent
//! error log that survives the process.

pub mod cadence;
mod error;
pub mod error_log;
pub mod log_rotation;
pub mod paths;
mod runtime;

pub use cadence::{job_is_due, ScheduleRule};
pub use error::{DaemonError, ScheduleError};
pub use error_log::{ErrorEntry, ErrorSink, FileErrorSink};
pub use runtime::{
    init_tracing, start_blocking, JobOutcome, JobRunner, RunExit, Scheduler, SchedulerState,
    Ticker, WallClockTicker,
};
