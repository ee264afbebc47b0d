//! Two-phase scheduler loop.
//!
//! 1. Initial pass: every job without a cadence runs once, in config order.
//! 2. Poll: when at least one job repeats, wake on every tick, run the due
//!    jobs and record `last_run` for the ones that succeeded.
//!
//! Jobs run one at a time on the blocking pool; a failed job is written to
//! the [`ErrorSink`] and never stops the loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use sheetsync_core::{JobKey, SyncJob};
use sheetsync_sync::{JobReport, SyncOrchestrator};

use crate::cadence::job_is_due;
use crate::error::{io_err, DaemonError};
use crate::error_log::{ErrorEntry, ErrorSink};
use crate::paths::POLL_INTERVAL;

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

/// Result of one job run as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Ok(JobReport),
    Failed { reason: String },
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, JobOutcome::Ok(_))
    }
}

/// Executes a single job synchronously.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: &SyncJob) -> JobOutcome;
}

impl JobRunner for SyncOrchestrator {
    fn run(&self, job: &SyncJob) -> JobOutcome {
        match self.run_job(job) {
            Ok(report) => JobOutcome::Ok(report),
            Err(err) => JobOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler state and time source
// ---------------------------------------------------------------------------

/// Last successful run per job; the only state kept between cycles.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    last_run: HashMap<JobKey, NaiveDateTime>,
}

impl SchedulerState {
    pub fn last_run(&self, key: &JobKey) -> Option<NaiveDateTime> {
        self.last_run.get(key).copied()
    }

    pub fn record_success(&mut self, key: JobKey, at: NaiveDateTime) {
        self.last_run.insert(key, at);
    }
}

/// Source of "now" and of the wait between polls.
pub trait Ticker: Send {
    fn now(&self) -> NaiveDateTime;

    /// Wait for the next poll. `false` ends the loop.
    fn tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Local wall-clock time, sleeping a fixed period between polls.
#[derive(Debug, Clone, Copy)]
pub struct WallClockTicker {
    period: Duration,
}

impl WallClockTicker {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for WallClockTicker {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

impl Ticker for WallClockTicker {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn tick(&mut self) -> bool {
        tokio::time::sleep(self.period).await;
        true
    }
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// How the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// No job repeats; the initial pass was all there was to do.
    OneShot,
    /// The ticker ended the polling loop.
    TickerStopped,
    /// Ctrl-C.
    Interrupted,
}

/// Jobs, the runner that executes them and the sink that records failures.
pub struct Scheduler<R: JobRunner> {
    jobs: Vec<SyncJob>,
    runner: Arc<R>,
    sink: Arc<dyn ErrorSink>,
    state: SchedulerState,
}

impl<R: JobRunner> Scheduler<R> {
    pub fn new(jobs: Vec<SyncJob>, runner: Arc<R>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            jobs,
            runner,
            sink,
            state: SchedulerState::default(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Run both phases until the ticker stops (or forever).
    pub async fn run<T: Ticker>(&mut self, ticker: &mut T) -> Result<RunExit, DaemonError> {
        tracing::info!("performing initial run for all non-repeating jobs");
        for job in self.jobs.iter().filter(|j| !j.is_repeating()).cloned().collect::<Vec<_>>() {
            let started = ticker.now();
            if self.execute(&job).await?.is_ok() {
                self.state.record_success(job.key(), started);
            }
        }

        let repeating: Vec<SyncJob> = self.jobs.iter().filter(|j| j.is_repeating()).cloned().collect();
        if repeating.is_empty() {
            tracing::info!("no repeating jobs configured");
            return Ok(RunExit::OneShot);
        }

        tracing::info!(jobs = repeating.len(), "scheduler started, checking for due jobs");
        loop {
            let now = ticker.now();
            for job in &repeating {
                let key = job.key();
                if !job_is_due(job, now, self.state.last_run(&key)) {
                    continue;
                }
                tracing::info!(job = %job.display_name(), "scheduled job is due");
                if self.execute(job).await?.is_ok() {
                    self.state.record_success(key, now);
                }
            }
            if !ticker.tick().await {
                return Ok(RunExit::TickerStopped);
            }
        }
    }

    /// Run one job on the blocking pool and report a failure to the sink.
    async fn execute(&self, job: &SyncJob) -> Result<JobOutcome, DaemonError> {
        let runner = Arc::clone(&self.runner);
        let owned = job.clone();
        let outcome = tokio::task::spawn_blocking(move || runner.run(&owned))
            .await
            .map_err(|err| DaemonError::Join {
                task: job.display_name().to_owned(),
                message: err.to_string(),
            })?;

        match &outcome {
            JobOutcome::Ok(report) => tracing::info!(
                job = %job.display_name(),
                created = report.upsert.created,
                updated = report.upsert.updated,
                "job finished"
            ),
            JobOutcome::Failed { reason } => {
                tracing::error!(
                    job = %job.display_name(),
                    range = %job.range,
                    database_id = %job.database_id,
                    error = %reason,
                    "job failed"
                );
                self.sink.record(&ErrorEntry::for_job(job, reason.clone()));
            }
        }
        Ok(outcome)
    }
}

/// Run the scheduler against the wall clock on a fresh tokio runtime,
/// stopping on Ctrl-C.
pub fn start_blocking<R: JobRunner>(
    jobs: Vec<SyncJob>,
    runner: Arc<R>,
    sink: Arc<dyn ErrorSink>,
) -> Result<RunExit, DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let mut scheduler = Scheduler::new(jobs, runner, sink);
        let mut ticker = WallClockTicker::default();
        tokio::select! {
            result = scheduler.run(&mut ticker) => result,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, stopping scheduler");
                    Ok(RunExit::Interrupted)
                }
                Err(err) => Err(DaemonError::Signal(err.to_string())),
            },
        }
    })
}

/// Install the process-wide `tracing` subscriber (`RUST_LOG`, default `info`).
/// Output goes to stderr so command output on stdout stays parseable.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
