//! Dry-run planning for `sheetsync plan`.
//!
//! Reads both stores and reports what a sync would change without writing to
//! either: the upsert plan for the grid's current content and, for jobs that
//! write to the grid, a unified diff of the rows the grid would end up with.

use std::collections::BTreeSet;

use similar::TextDiff;

use sheetsync_core::types::canonical_header;
use sheetsync_core::{CellValue, FieldKind, Priority, Schema, SyncJob};

use crate::mapper::render_number;
use crate::pipeline::{prepare_write, SyncOrchestrator};
use crate::store::{detailed_to_grid, RenderMode, WriteRows};
use crate::upsert::{plan_upserts, UpsertPlan};
use crate::SyncError;

/// Everything a job would do, computed without side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub job: String,
    pub upsert: UpsertPlan,
    /// `None` for grid-priority jobs and when the grid would not change.
    pub grid_diff: Option<String>,
}

/// Plan `job` against the orchestrator's stores.
pub fn plan_job(orchestrator: &SyncOrchestrator, job: &SyncJob) -> Result<JobPlan, SyncError> {
    let schema = orchestrator.schema(job)?;
    let grid_store = orchestrator.grid_store();

    let grid_diff = match job.priority {
        Priority::GridAuthoritative => None,
        Priority::RecordAuthoritative | Priority::Calculator => {
            let formula_view = grid_store.read_range(&job.range, RenderMode::Formula)?;
            let current = grid_store.read_range(&job.range, RenderMode::Formatted)?.to_rows();
            let records = orchestrator.presented_records(job)?;
            let prepared = prepare_write(
                &schema,
                &formula_view,
                &records,
                orchestrator.record_store(),
                job.priority == Priority::Calculator,
            );
            let kinds = column_kinds(&schema, &prepared.header);
            let payload = prepared.mask.apply(prepared.rows);
            let old = render_rows(&current, &kinds);
            let new = render_rows(&overlay(&current, &payload), &kinds);
            if old == new {
                None
            } else {
                let old_header = format!("a/{}", job.range);
                let new_header = format!("b/{}", job.range);
                Some(
                    TextDiff::from_lines(&old, &new)
                        .unified_diff()
                        .header(&old_header, &new_header)
                        .context_radius(3)
                        .to_string(),
                )
            }
        }
    };

    let grid = match job.priority {
        Priority::GridAuthoritative => grid_store.read_range(&job.range, RenderMode::Formatted)?,
        _ => detailed_to_grid(grid_store.read_grid_detailed(&job.range)?),
    };
    let records = orchestrator.record_store().query_all(&job.database_id)?;
    let upsert = plan_upserts(&grid, &records, &schema, &BTreeSet::new());

    Ok(JobPlan {
        job: job.display_name().to_owned(),
        upsert,
        grid_diff,
    })
}

fn column_kinds(schema: &Schema, header: &[String]) -> Vec<Option<FieldKind>> {
    header
        .iter()
        .map(|h| schema.get(canonical_header(h).0).map(|f| f.kind.clone()))
        .collect()
}

/// Apply a write payload on top of the current rows; `None` keeps the
/// current cell.
fn overlay(current: &[Vec<CellValue>], payload: &WriteRows) -> Vec<Vec<CellValue>> {
    let height = current.len().max(payload.len());
    (0..height)
        .map(|r| {
            let old = current.get(r).map(Vec::as_slice).unwrap_or(&[]);
            let new = payload.get(r).map(Vec::as_slice).unwrap_or(&[]);
            let width = old.len().max(new.len());
            (0..width)
                .map(|c| match new.get(c) {
                    Some(Some(value)) => value.clone(),
                    _ => old.get(c).cloned().unwrap_or_default(),
                })
                .collect()
        })
        .collect()
}

fn render_rows(rows: &[Vec<CellValue>], kinds: &[Option<FieldKind>]) -> String {
    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, cell)| match (cell, kinds.get(c)) {
                (CellValue::Number(n), Some(Some(FieldKind::Number(format)))) => {
                    render_number(*n, format)
                }
                _ => cell.as_text(),
            })
            .collect();
        out.push_str(cells.join("\t").trim_end_matches('\t'));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sheetsync_core::{FieldDescriptor, FieldValue, NumberFormat, Record};

    use super::*;
    use crate::memory::{MemoryGridStore, MemoryRecordStore};

    fn setup(grid_rows: Vec<Vec<CellValue>>) -> (Arc<MemoryRecordStore>, Arc<MemoryGridStore>) {
        let records = Arc::new(MemoryRecordStore::new().with_schema(
            "db",
            Schema::new(vec![
                FieldDescriptor::new("Name", FieldKind::Title),
                FieldDescriptor::new("Price", FieldKind::Number(NumberFormat::Dollar)),
            ]),
        ));
        records.insert_record(
            &"db".into(),
            Record::new("r-1")
                .with_field("Name", FieldValue::Text("Lamp".into()))
                .with_field("Price", FieldValue::Number(Some(1234.5))),
        );
        let grid = Arc::new(MemoryGridStore::new("Items").with_rows(grid_rows));
        (records, grid)
    }

    fn job(priority: Priority) -> SyncJob {
        SyncJob {
            range: "Items!A:B".into(),
            database_id: "db".into(),
            priority,
            name: Some("items".into()),
            cadence: None,
        }
    }

    #[test]
    fn record_job_diff_shows_rendered_numbers() {
        let (records, grid) = setup(vec![
            vec!["Name".into(), "Price".into()],
            vec!["Lamp".into(), "$1,000.0000".into()],
        ]);
        let orchestrator = SyncOrchestrator::new(records.clone(), grid.clone());

        let plan = plan_job(&orchestrator, &job(Priority::RecordAuthoritative)).expect("plan");
        let diff = plan.grid_diff.expect("diff");
        assert!(diff.contains("--- a/Items!A:B"));
        assert!(diff.contains("-Lamp\t$1,000.0000"));
        assert!(diff.contains("+Lamp\t$1,234.5000"));
        assert!(grid.writes().is_empty(), "planning must not write");
        assert!(records.calls().is_empty());
    }

    #[test]
    fn up_to_date_grid_has_no_diff() {
        let (records, grid) = setup(vec![
            vec!["Name".into(), "Price".into()],
            vec!["Lamp".into(), "$1,234.5000".into()],
        ]);
        let orchestrator = SyncOrchestrator::new(records, grid);
        let plan = plan_job(&orchestrator, &job(Priority::RecordAuthoritative)).expect("plan");
        assert_eq!(plan.grid_diff, None);
    }

    #[test]
    fn grid_job_plans_creates_only() {
        let (records, grid) = setup(vec![
            vec!["Name".into(), "Price".into()],
            vec!["Desk".into(), "$99.0000".into()],
        ]);
        let orchestrator = SyncOrchestrator::new(records, grid);
        let plan = plan_job(&orchestrator, &job(Priority::GridAuthoritative)).expect("plan");
        assert_eq!(plan.grid_diff, None);
        assert_eq!(plan.upsert.creates(), 1);
        assert_eq!(plan.job, "items");
    }

    #[test]
    fn masked_cells_keep_current_text() {
        let current = vec![vec!["a".into(), "b".into()]];
        let payload: WriteRows = vec![vec![Some("x".into()), None], vec![Some("y".into())]];
        assert_eq!(
            overlay(&current, &payload),
            vec![vec!["x".into(), "b".into()], vec![CellValue::from("y")]]
        );
    }
}
