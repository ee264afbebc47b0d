//! Collaborator seam: what the engine needs from each store.
//!
//! Every call is blocking and synchronous. Implementations own transport,
//! authentication and wire formats; the engine only sees core types.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use sheetsync_core::{CellValue, DatabaseId, FieldValue, Grid, RangeRef, Record, RecordId, Schema};

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or API-level failure.
    #[error("{store} request failed: {message}")]
    Request {
        store: &'static str,
        message: String,
    },

    /// The store answered, but not in a shape we understand.
    #[error("{store} returned malformed data: {message}")]
    Malformed {
        store: &'static str,
        message: String,
    },

    /// The addressed record does not exist.
    #[error("record {0} not found")]
    NotFound(RecordId),
}

/// How a grid read renders cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Values as displayed, after number formats are applied.
    Formatted,
    /// Raw input: formulas come back as their `=...` text.
    Formula,
}

/// A cell from a detailed grid read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailedCell {
    /// Typed value after evaluation (number, string or bool).
    pub effective: Option<CellValue>,
    pub formatted: Option<String>,
}

impl DetailedCell {
    /// Effective typed value, else the formatted text, else empty.
    pub fn value(&self) -> CellValue {
        match (&self.effective, &self.formatted) {
            (Some(v), _) if !matches!(v, CellValue::Empty) => v.clone(),
            (_, Some(text)) => CellValue::Text(text.clone()),
            _ => CellValue::Empty,
        }
    }
}

/// Convert a detailed read into a [`Grid`].
pub fn detailed_to_grid(cells: Vec<Vec<DetailedCell>>) -> Grid {
    Grid::from_rows(
        cells
            .into_iter()
            .map(|row| row.iter().map(DetailedCell::value).collect())
            .collect(),
    )
}

/// Outgoing grid payload. `None` leaves the cell untouched.
pub type WriteRows = Vec<Vec<Option<CellValue>>>;

/// Data rows of a single column on one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRange {
    pub sheet_id: i64,
    /// First row the rule covers (0-based; 1 skips the header).
    pub start_row: usize,
    pub column: usize,
}

/// Validation or display rule for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatRule {
    /// Dropdown restricted to the given options.
    OneOfList { options: Vec<String> },
    /// Checkbox.
    Boolean,
    /// Number display pattern, e.g. `$#,##0.0000`.
    NumberPattern { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattingDirective {
    pub range: ColumnRange,
    pub rule: FormatRule,
}

/// The schema-described record store.
pub trait RecordStore: Send + Sync {
    fn get_schema(&self, database_id: &DatabaseId) -> Result<Schema, StoreError>;

    /// Every record of the database, all pages consumed, in store order.
    fn query_all(&self, database_id: &DatabaseId) -> Result<Vec<Record>, StoreError>;

    fn create_record(
        &self,
        database_id: &DatabaseId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<RecordId, StoreError>;

    fn update_record(
        &self,
        id: &RecordId,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StoreError>;

    /// Plain text of the record's title field.
    fn get_record_title(&self, id: &RecordId) -> Result<String, StoreError>;
}

/// The spreadsheet-like grid store.
pub trait GridStore: Send + Sync {
    /// Read a range; row 0 of the range becomes the header.
    fn read_range(&self, range: &RangeRef, mode: RenderMode) -> Result<Grid, StoreError>;

    /// Read a range cell by cell with typed effective values.
    fn read_grid_detailed(&self, range: &RangeRef) -> Result<Vec<Vec<DetailedCell>>, StoreError>;

    /// Write rows starting at the range's top-left cell (header row included).
    fn write_range(&self, range: &RangeRef, rows: &WriteRows) -> Result<(), StoreError>;

    fn apply_formatting_rules(
        &self,
        sheet_id: i64,
        directives: &[FormattingDirective],
    ) -> Result<(), StoreError>;

    /// Numeric id of the named sheet, `None` if there is no such sheet.
    fn resolve_sheet_id(&self, name: &str) -> Result<Option<i64>, StoreError>;
}
