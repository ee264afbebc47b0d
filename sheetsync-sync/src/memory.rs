//! In-process [`RecordStore`] and [`GridStore`] implementations.
//!
//! Both record every mutating call so tests can assert on exact payloads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sheetsync_core::{CellValue, DatabaseId, FieldValue, Grid, RangeRef, Record, RecordId, Schema};

use crate::store::{
    DetailedCell, FormattingDirective, GridStore, RecordStore, RenderMode, StoreError, WriteRows,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// A mutating call received by [`MemoryRecordStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCall {
    Create {
        database_id: DatabaseId,
        fields: BTreeMap<String, FieldValue>,
    },
    Update {
        id: RecordId,
        fields: BTreeMap<String, FieldValue>,
    },
}

#[derive(Debug, Default)]
struct RecordState {
    schemas: HashMap<DatabaseId, Schema>,
    records: BTreeMap<DatabaseId, Vec<Record>>,
    calls: Vec<RecordCall>,
    next_id: usize,
    unreachable: bool,
}

impl RecordState {
    fn find_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| &r.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<RecordState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, database_id: impl Into<DatabaseId>, schema: Schema) -> Self {
        lock(&self.state).schemas.insert(database_id.into(), schema);
        self
    }

    /// Seed a record without logging a call.
    pub fn insert_record(&self, database_id: &DatabaseId, record: Record) {
        lock(&self.state)
            .records
            .entry(database_id.clone())
            .or_default()
            .push(record);
    }

    /// Current records of a database, in store order.
    pub fn records(&self, database_id: &DatabaseId) -> Vec<Record> {
        lock(&self.state)
            .records
            .get(database_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RecordCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Make every subsequent call fail with a request error.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    fn check_reachable(state: &RecordState) -> Result<(), StoreError> {
        if state.unreachable {
            return Err(StoreError::Request {
                store: "record store",
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_schema(&self, database_id: &DatabaseId) -> Result<Schema, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        state
            .schemas
            .get(database_id)
            .cloned()
            .ok_or_else(|| StoreError::Request {
                store: "record store",
                message: format!("database {database_id} does not exist"),
            })
    }

    fn query_all(&self, database_id: &DatabaseId) -> Result<Vec<Record>, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        Ok(state.records.get(database_id).cloned().unwrap_or_default())
    }

    fn create_record(
        &self,
        database_id: &DatabaseId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<RecordId, StoreError> {
        let mut state = lock(&self.state);
        Self::check_reachable(&state)?;
        state.next_id += 1;
        let id = RecordId(format!("rec-{}", state.next_id));
        state.calls.push(RecordCall::Create {
            database_id: database_id.clone(),
            fields: fields.clone(),
        });
        state
            .records
            .entry(database_id.clone())
            .or_default()
            .push(Record {
                id: id.clone(),
                fields: fields.clone(),
            });
        Ok(id)
    }

    fn update_record(
        &self,
        id: &RecordId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        Self::check_reachable(&state)?;
        state.calls.push(RecordCall::Update {
            id: id.clone(),
            fields: fields.clone(),
        });
        let record = state
            .find_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.fields.extend(fields.clone());
        Ok(())
    }

    fn get_record_title(&self, id: &RecordId) -> Result<String, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        for (database_id, records) in &state.records {
            let Some(record) = records.iter().find(|r| &r.id == id) else {
                continue;
            };
            let title_field = state
                .schemas
                .get(database_id)
                .and_then(|s| s.title_field())
                .map(|f| f.name.as_str());
            let title = match title_field {
                Some(name) => record.text(name),
                None => record.fields.values().find_map(|v| match v {
                    FieldValue::Text(s) => Some(s.as_str()),
                    _ => None,
                }),
            };
            return Ok(title.unwrap_or_default().to_owned());
        }
        Err(StoreError::NotFound(id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Grid store
// ---------------------------------------------------------------------------

/// One cell of [`MemoryGridStore`]: its computed value and, for live
/// formulas, the formula text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCell {
    pub formula: Option<String>,
    pub value: CellValue,
}

impl From<CellValue> for MemoryCell {
    fn from(value: CellValue) -> Self {
        Self {
            formula: None,
            value,
        }
    }
}

/// Recomputes formula cells after a write.
pub type Recalc = fn(&mut Vec<Vec<MemoryCell>>);

#[derive(Debug, Default)]
struct GridState {
    cells: Vec<Vec<MemoryCell>>,
    sheets: BTreeMap<String, i64>,
    writes: Vec<WriteRows>,
    formatting: Vec<(i64, Vec<FormattingDirective>)>,
    recalc: Option<Recalc>,
    unreachable: bool,
}

/// A grid holding a single range. Range references passed to reads and
/// writes are ignored; sheet names only matter to `resolve_sheet_id`.
#[derive(Debug, Default)]
pub struct MemoryGridStore {
    state: Mutex<GridState>,
}

impl MemoryGridStore {
    /// Empty grid on a sheet called `sheet` with id 0.
    pub fn new(sheet: &str) -> Self {
        let store = Self::default();
        lock(&store.state).sheets.insert(sheet.to_owned(), 0);
        store
    }

    /// Replace the grid content with plain values (header first).
    pub fn with_rows(self, rows: Vec<Vec<CellValue>>) -> Self {
        lock(&self.state).cells = rows
            .into_iter()
            .map(|row| row.into_iter().map(MemoryCell::from).collect())
            .collect();
        self
    }

    pub fn with_recalc(self, recalc: Recalc) -> Self {
        lock(&self.state).recalc = Some(recalc);
        self
    }

    /// Place a live formula at `(row, col)` (header is row 0).
    pub fn set_formula(&self, row: usize, col: usize, formula: &str, value: CellValue) {
        let mut state = lock(&self.state);
        let cell = cell_mut(&mut state.cells, row, col);
        cell.formula = Some(formula.to_owned());
        cell.value = value;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Current computed values, header row included.
    pub fn values(&self) -> Vec<Vec<CellValue>> {
        lock(&self.state)
            .cells
            .iter()
            .map(|row| row.iter().map(|c| c.value.clone()).collect())
            .collect()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<MemoryCell> {
        lock(&self.state)
            .cells
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
    }

    /// Every payload passed to `write_range`, in call order.
    pub fn writes(&self) -> Vec<WriteRows> {
        lock(&self.state).writes.clone()
    }

    pub fn formatting(&self) -> Vec<(i64, Vec<FormattingDirective>)> {
        lock(&self.state).formatting.clone()
    }

    fn check_reachable(state: &GridState) -> Result<(), StoreError> {
        if state.unreachable {
            return Err(StoreError::Request {
                store: "grid store",
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

fn cell_mut(cells: &mut Vec<Vec<MemoryCell>>, row: usize, col: usize) -> &mut MemoryCell {
    if cells.len() <= row {
        cells.resize_with(row + 1, Vec::new);
    }
    let r = &mut cells[row];
    if r.len() <= col {
        r.resize_with(col + 1, MemoryCell::default);
    }
    &mut r[col]
}

fn formatted_text(cell: &MemoryCell) -> CellValue {
    match &cell.value {
        CellValue::Empty => CellValue::Empty,
        other => CellValue::Text(other.as_text()),
    }
}

impl GridStore for MemoryGridStore {
    fn read_range(&self, _range: &RangeRef, mode: RenderMode) -> Result<Grid, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        let rows = state
            .cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match (mode, &cell.formula) {
                        (RenderMode::Formula, Some(f)) => CellValue::Text(f.clone()),
                        _ => formatted_text(cell),
                    })
                    .collect()
            })
            .collect();
        Ok(Grid::from_rows(rows))
    }

    fn read_grid_detailed(&self, _range: &RangeRef) -> Result<Vec<Vec<DetailedCell>>, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        Ok(state
            .cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match &cell.value {
                        CellValue::Empty => DetailedCell::default(),
                        value => DetailedCell {
                            effective: Some(value.clone()),
                            formatted: Some(value.as_text()),
                        },
                    })
                    .collect()
            })
            .collect())
    }

    fn write_range(&self, _range: &RangeRef, rows: &WriteRows) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        Self::check_reachable(&state)?;
        state.writes.push(rows.clone());
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if let Some(value) = value {
                    let cell = cell_mut(&mut state.cells, r, c);
                    cell.formula = None;
                    cell.value = value.clone();
                }
            }
        }
        if let Some(recalc) = state.recalc {
            recalc(&mut state.cells);
        }
        Ok(())
    }

    fn apply_formatting_rules(
        &self,
        sheet_id: i64,
        directives: &[FormattingDirective],
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        Self::check_reachable(&state)?;
        state.formatting.push((sheet_id, directives.to_vec()));
        Ok(())
    }

    fn resolve_sheet_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let state = lock(&self.state);
        Self::check_reachable(&state)?;
        Ok(state.sheets.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_write_leaves_formula_in_place() {
        let grid = MemoryGridStore::new("Tasks").with_rows(vec![
            vec!["Title".into(), "Total".into()],
            vec!["A".into(), CellValue::Empty],
        ]);
        grid.set_formula(1, 1, "=1+1", CellValue::Number(2.0));

        let range = RangeRef::from("Tasks!A:B");
        grid.write_range(&range, &vec![vec![Some("Title".into()), Some("Total".into())], vec![
            Some("B".into()),
            None,
        ]])
        .expect("write");

        let cell = grid.cell(1, 1).expect("cell");
        assert_eq!(cell.formula.as_deref(), Some("=1+1"));
        let formula_view = grid.read_range(&range, RenderMode::Formula).expect("read");
        assert_eq!(formula_view.cell(0, 1), &CellValue::Text("=1+1".into()));
        assert_eq!(formula_view.cell(0, 0), &CellValue::Text("B".into()));
    }

    #[test]
    fn created_records_get_fresh_ids_and_titles() {
        let db = DatabaseId::from("db");
        let store = MemoryRecordStore::new().with_schema(
            "db",
            Schema::new(vec![sheetsync_core::FieldDescriptor::new(
                "Name",
                sheetsync_core::FieldKind::Title,
            )]),
        );
        let fields = BTreeMap::from([("Name".to_string(), FieldValue::Text("Apollo".into()))]);
        let id = store.create_record(&db, &fields).expect("create");
        assert_eq!(store.get_record_title(&id).expect("title"), "Apollo");
        assert_eq!(store.records(&db).len(), 1);
        assert!(matches!(
            store.get_record_title(&RecordId::from("nope")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn unreachable_store_fails_every_call() {
        let store = MemoryRecordStore::new();
        store.set_unreachable(true);
        assert!(store.query_all(&DatabaseId::from("db")).is_err());
    }
}
