//! Drives the scheduler with the real orchestrator over in-memory stores.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use sheetsync_core::{Cadence, CellValue, FieldDescriptor, FieldKind, Priority, Schema, SyncJob};
use sheetsync_daemon::{ErrorEntry, ErrorSink, FileErrorSink, RunExit, Scheduler, Ticker};
use sheetsync_sync::memory::{MemoryGridStore, MemoryRecordStore};
use sheetsync_sync::{SettleTimer, SyncOrchestrator};
use tempfile::TempDir;

struct InstantSettle;

impl SettleTimer for InstantSettle {
    fn settle(&self, _delay: Duration) {}
}

#[derive(Default)]
struct Collect(Mutex<Vec<ErrorEntry>>);

impl ErrorSink for Collect {
    fn record(&self, entry: &ErrorEntry) {
        self.0.lock().expect("lock").push(entry.clone());
    }
}

/// Minute-by-minute virtual clock that stops after `polls` ticks.
struct Minutes {
    now: NaiveDateTime,
    polls: usize,
}

impl Ticker for Minutes {
    fn now(&self) -> NaiveDateTime {
        self.now
    }

    async fn tick(&mut self) -> bool {
        if self.polls == 0 {
            return false;
        }
        self.polls -= 1;
        self.now += chrono::Duration::minutes(1);
        true
    }
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .expect("datetime")
}

fn grid_job(range: &str, cadence: Option<(&str, &str)>) -> SyncJob {
    SyncJob {
        range: range.into(),
        database_id: "db".into(),
        priority: Priority::GridAuthoritative,
        name: None,
        cadence: cadence.map(|(interval, value)| Cadence {
            interval: Some(interval.into()),
            value: Some(value.into()),
        }),
    }
}

fn stores() -> (Arc<MemoryRecordStore>, Arc<MemoryGridStore>) {
    let records = Arc::new(MemoryRecordStore::new().with_schema(
        "db",
        Schema::new(vec![FieldDescriptor::new("Title", FieldKind::Title)]),
    ));
    let grid = Arc::new(MemoryGridStore::new("Tasks").with_rows(vec![
        vec![CellValue::from("Title")],
        vec![CellValue::from("Write report")],
    ]));
    (records, grid)
}

#[tokio::test]
async fn daily_job_runs_once_at_its_minute() {
    let (records, grid) = stores();
    let orchestrator =
        Arc::new(SyncOrchestrator::new(records.clone(), grid).with_timer(Arc::new(InstantSettle)));
    let job = grid_job("Tasks!A:A", Some(("day", "09:05")));
    let key = job.key();
    let mut scheduler = Scheduler::new(vec![job], orchestrator, Arc::new(Collect::default()));
    let mut clock = Minutes {
        now: at(9, 0),
        polls: 30,
    };

    let exit = scheduler.run(&mut clock).await.expect("run");

    assert_eq!(exit, RunExit::TickerStopped);
    assert_eq!(scheduler.state().last_run(&key), Some(at(9, 5)));
    assert_eq!(records.calls().len(), 1, "one create from a single run");
}

#[tokio::test]
async fn malformed_cadence_never_fires() {
    let (records, grid) = stores();
    let orchestrator =
        Arc::new(SyncOrchestrator::new(records.clone(), grid).with_timer(Arc::new(InstantSettle)));
    let sink = Arc::new(Collect::default());
    let mut scheduler = Scheduler::new(
        vec![grid_job("Tasks!A:A", Some(("day", "nine o'clock")))],
        orchestrator,
        sink.clone(),
    );
    let mut clock = Minutes {
        now: at(0, 0),
        polls: 60 * 24,
    };

    scheduler.run(&mut clock).await.expect("run");

    assert!(records.calls().is_empty());
    assert!(sink.0.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn failures_land_in_the_error_log_and_the_loop_continues() {
    let home = TempDir::new().expect("home");
    let log = sheetsync_daemon::paths::error_log_path(home.path());
    let (records, grid) = stores();
    grid.set_unreachable(true);
    let orchestrator =
        Arc::new(SyncOrchestrator::new(records.clone(), grid).with_timer(Arc::new(InstantSettle)));
    let mut scheduler = Scheduler::new(
        vec![
            grid_job("Tasks!A:A", None),
            grid_job("Missing!A:A", Some(("hour", "1"))),
        ],
        orchestrator,
        Arc::new(FileErrorSink::new(&log)),
    );
    let mut clock = Minutes {
        now: at(9, 0),
        polls: 5,
    };

    let exit = scheduler.run(&mut clock).await.expect("run");

    assert_eq!(exit, RunExit::TickerStopped);
    let lines: Vec<ErrorEntry> = std::fs::read_to_string(&log)
        .expect("error log")
        .lines()
        .map(|l| serde_json::from_str(l).expect("json"))
        .collect();
    assert_eq!(lines.len(), 2, "initial pass failure plus the 09:01 run");
    assert_eq!(lines[0].range, "Tasks!A:A");
    assert_eq!(lines[1].range, "Missing!A:A");
}
