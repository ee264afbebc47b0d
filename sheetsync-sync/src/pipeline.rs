//! Per-job sync protocols.
//!
//! - grid priority: formatted read, reconcile into the record store.
//! - record priority: records → grid (masked) → settle → read back →
//!   reconcile.
//! - calculator priority: like record priority, but `[replace]` columns are
//!   left to grid-side editing and the settle delay is doubled.
//!
//! Every store call is blocking and issued strictly in protocol order.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use sheetsync_core::config::DEFAULT_SETTLE_DELAY;
use sheetsync_core::types::{canonical_header, ID_HEADER};
use sheetsync_core::{CellValue, FieldKind, Grid, Priority, Record, Schema, SyncJob};

use crate::guard::{compute_write_mask, override_columns, WriteMask};
use crate::mapper::{display_pattern, field_to_cell};
use crate::store::{
    detailed_to_grid, ColumnRange, FormatRule, FormattingDirective, GridStore, RecordStore,
    RenderMode,
};
use crate::upsert::{UpsertResolver, UpsertSummary};
use crate::SyncError;

// ---------------------------------------------------------------------------
// Settle timer
// ---------------------------------------------------------------------------

/// Waits for the grid to finish recalculating after a write.
pub trait SettleTimer: Send + Sync {
    fn settle(&self, delay: Duration);
}

/// Blocks the calling thread for the full delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSettle;

impl SettleTimer for ThreadSettle {
    fn settle(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What one successful job run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub priority: Priority,
    /// Data rows sent to the grid (0 for grid-priority jobs).
    pub rows_written: usize,
    pub cells_masked: usize,
    pub formatting_rules: usize,
    pub upsert: UpsertSummary,
}

// ---------------------------------------------------------------------------
// Record → grid payload
// ---------------------------------------------------------------------------

/// Rows the record→grid step would write, before masking.
#[derive(Debug, Clone)]
pub(crate) struct PreparedWrite {
    pub header: Vec<String>,
    /// Header row first, then one row per record.
    pub rows: Vec<Vec<CellValue>>,
    pub mask: WriteMask,
}

/// Build the outgoing rows for `records` (already in presentation order)
/// against the grid's current formula view.
///
/// Column order follows the grid's header row; an empty grid gets the
/// schema's field names in reverse declaration order. Columns matching no
/// field are masked so grid-side data there is left alone.
pub(crate) fn prepare_write(
    schema: &Schema,
    formula_view: &Grid,
    records: &[Record],
    titles: &dyn RecordStore,
    calculator: bool,
) -> PreparedWrite {
    let header: Vec<String> = if formula_view.header.iter().any(|h| !h.is_empty()) {
        formula_view.header.clone()
    } else {
        schema.iter().rev().map(|f| f.name.clone()).collect()
    };

    let mut mask = compute_write_mask(formula_view);
    if calculator {
        for col in override_columns(&header) {
            mask.exclude_column(col);
        }
    }

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(header.iter().map(|h| CellValue::Text(h.clone())).collect());
    for (col, h) in header.iter().enumerate() {
        if h != ID_HEADER && schema.get(canonical_header(h).0).is_none() {
            mask.exclude_column(col);
        }
    }

    for record in records {
        let row = header
            .iter()
            .map(|h| {
                if h == ID_HEADER {
                    return CellValue::Text(record.id.0.clone());
                }
                let (name, _) = canonical_header(h);
                match schema.get(name) {
                    Some(field) => field_to_cell(&field.kind, record.fields.get(name), titles),
                    None => CellValue::Empty,
                }
            })
            .collect();
        rows.push(row);
    }

    PreparedWrite { header, rows, mask }
}

/// Validation and display directives for each writable column.
fn formatting_directives(
    schema: &Schema,
    header: &[String],
    mask: &WriteMask,
    sheet_id: i64,
) -> Vec<FormattingDirective> {
    header
        .iter()
        .enumerate()
        .filter(|(col, h)| *h != ID_HEADER && !mask.excluded_columns().contains(col))
        .filter_map(|(column, h)| {
            let field = schema.get(canonical_header(h).0)?;
            let rule = match &field.kind {
                FieldKind::Select(options) => FormatRule::OneOfList {
                    options: options.clone(),
                },
                FieldKind::Checkbox => FormatRule::Boolean,
                FieldKind::Number(format) => FormatRule::NumberPattern {
                    pattern: display_pattern(format).to_owned(),
                },
                _ => return None,
            };
            Some(FormattingDirective {
                range: ColumnRange {
                    sheet_id,
                    start_row: 1,
                    column,
                },
                rule,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs one job's protocol against a pair of stores.
pub struct SyncOrchestrator {
    records: Arc<dyn RecordStore>,
    grid: Arc<dyn GridStore>,
    timer: Arc<dyn SettleTimer>,
    settle_delay: Duration,
}

impl SyncOrchestrator {
    pub fn new(records: Arc<dyn RecordStore>, grid: Arc<dyn GridStore>) -> Self {
        Self {
            records,
            grid,
            timer: Arc::new(ThreadSettle),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_timer(mut self, timer: Arc<dyn SettleTimer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn record_store(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn grid_store(&self) -> &dyn GridStore {
        self.grid.as_ref()
    }

    /// Run the protocol selected by the job's priority.
    pub fn run_job(&self, job: &SyncJob) -> Result<JobReport, SyncError> {
        tracing::info!(
            "sync '{}' ({} <-> {}, priority {})",
            job.display_name(),
            job.range,
            job.database_id,
            job.priority
        );
        match job.priority {
            Priority::GridAuthoritative => self.grid_to_records(job),
            Priority::RecordAuthoritative => self.round_trip(job, false),
            Priority::Calculator => self.round_trip(job, true),
        }
    }

    pub(crate) fn schema(&self, job: &SyncJob) -> Result<Schema, SyncError> {
        let schema = self.records.get_schema(&job.database_id)?;
        if schema.is_empty() {
            return Err(SyncError::EmptySchema {
                database_id: job.database_id.to_string(),
            });
        }
        Ok(schema)
    }

    /// Records in presentation order (store order reversed).
    pub(crate) fn presented_records(&self, job: &SyncJob) -> Result<Vec<Record>, SyncError> {
        let mut records = self.records.query_all(&job.database_id)?;
        records.reverse();
        Ok(records)
    }

    fn grid_to_records(&self, job: &SyncJob) -> Result<JobReport, SyncError> {
        let grid = self.grid.read_range(&job.range, RenderMode::Formatted)?;
        let schema = self.schema(job)?;
        let upsert = self.reconcile_into_records(job, &grid, &schema)?;
        Ok(JobReport {
            job: job.display_name().to_owned(),
            priority: job.priority,
            rows_written: 0,
            cells_masked: 0,
            formatting_rules: 0,
            upsert,
        })
    }

    fn round_trip(&self, job: &SyncJob, calculator: bool) -> Result<JobReport, SyncError> {
        let schema = self.schema(job)?;
        let formula_view = self.grid.read_range(&job.range, RenderMode::Formula)?;
        let records = self.presented_records(job)?;
        let prepared = prepare_write(
            &schema,
            &formula_view,
            &records,
            self.records.as_ref(),
            calculator,
        );

        let mut formatting_rules = 0;
        if records.is_empty() {
            tracing::info!("'{}': record store is empty, nothing to write", job.display_name());
        } else {
            let sheet = job.range.sheet_name();
            let sheet_id = self
                .grid
                .resolve_sheet_id(sheet)?
                .ok_or_else(|| SyncError::SheetNotFound {
                    sheet: sheet.to_owned(),
                })?;
            let directives =
                formatting_directives(&schema, &prepared.header, &prepared.mask, sheet_id);
            if !directives.is_empty() {
                self.grid.apply_formatting_rules(sheet_id, &directives)?;
            }
            formatting_rules = directives.len();

            let payload = prepared.mask.apply(prepared.rows);
            self.grid.write_range(&job.range, &payload)?;
            tracing::info!(
                "'{}': wrote {} rows ({} formula cells kept)",
                job.display_name(),
                records.len(),
                prepared.mask.len()
            );
        }

        let delay = if calculator {
            self.settle_delay * 2
        } else {
            self.settle_delay
        };
        self.timer.settle(delay);

        let read_back = detailed_to_grid(self.grid.read_grid_detailed(&job.range)?);
        let upsert = self.reconcile_into_records(job, &read_back, &schema)?;

        Ok(JobReport {
            job: job.display_name().to_owned(),
            priority: job.priority,
            rows_written: records.len(),
            cells_masked: prepared.mask.len(),
            formatting_rules,
            upsert,
        })
    }

    fn reconcile_into_records(
        &self,
        job: &SyncJob,
        grid: &Grid,
        schema: &Schema,
    ) -> Result<UpsertSummary, SyncError> {
        let resolver = UpsertResolver::new(self.records.as_ref());
        let plan = resolver.reconcile(&job.database_id, grid, schema, &BTreeSet::new())?;
        let summary = resolver.apply(&job.database_id, &plan)?;
        tracing::info!(
            "'{}': {} created, {} updated, {} unchanged/skipped, {} field skips",
            job.display_name(),
            summary.created,
            summary.updated,
            summary.skipped,
            summary.field_skips
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
