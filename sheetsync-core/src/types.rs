//! Domain types shared across sheetsync.
//!
//! Two stores are reconciled: a *grid* (header row + rows of cells, some of
//! them live formulas) and a *record store* (schema-described typed records
//! addressed by id or by their title field). Nothing here talks to either
//! store; see `sheetsync-sync` for that.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Header token reserved for record-identity round-tripping.
pub const ID_HEADER: &str = "ID";

/// Header suffix marking a column as manually overridden (calculator jobs).
pub const OVERRIDE_MARKER: &str = " [replace]";

/// First character of a live formula in the grid's raw (formula) rendering.
pub const FORMULA_SENTINEL: char = '=';

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a record-store database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(pub String);

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DatabaseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DatabaseId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A grid range reference in A1 notation, e.g. `Tasks!A:E`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeRef(pub String);

impl RangeRef {
    /// Sheet (tab) name: everything before the first `!`, or the whole
    /// reference when it names a sheet only.
    pub fn sheet_name(&self) -> &str {
        self.0.split('!').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RangeRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RangeRef {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identity of a record. Never changes once the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Field schema
// ---------------------------------------------------------------------------

/// Display format of a number field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NumberFormat {
    #[default]
    Number,
    NumberWithCommas,
    Percent,
    Dollar,
    Euro,
    /// Any format the engine has no dedicated handling for.
    Other(String),
}

impl NumberFormat {
    /// Currency symbol prefixed to rendered values, if any.
    pub fn currency_symbol(&self) -> Option<char> {
        match self {
            NumberFormat::Dollar => Some('$'),
            NumberFormat::Euro => Some('€'),
            _ => None,
        }
    }
}

impl From<&str> for NumberFormat {
    fn from(s: &str) -> Self {
        match s {
            "number" => NumberFormat::Number,
            "number_with_commas" => NumberFormat::NumberWithCommas,
            "percent" => NumberFormat::Percent,
            "dollar" => NumberFormat::Dollar,
            "euro" => NumberFormat::Euro,
            other => NumberFormat::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberFormat::Number => write!(f, "number"),
            NumberFormat::NumberWithCommas => write!(f, "number_with_commas"),
            NumberFormat::Percent => write!(f, "percent"),
            NumberFormat::Dollar => write!(f, "dollar"),
            NumberFormat::Euro => write!(f, "euro"),
            NumberFormat::Other(name) => name.fmt(f),
        }
    }
}

/// Type descriptor of a record field. One handler per variant lives in the
/// schema mapper; adding a variant is a compile error until it is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    Text,
    Number(NumberFormat),
    Checkbox,
    /// Single choice among the enumerated option names.
    Select(Vec<String>),
    MultiSelect(Vec<String>),
    /// Computed by the record store; read-only.
    Formula,
    /// Aggregated from related records; read-only.
    Rollup,
    /// Links to other records; read-only.
    Relation,
    /// A kind the engine does not translate (dates, people, files, ...).
    Unsupported(String),
}

impl FieldKind {
    /// `true` for kinds that only flow record→grid.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            FieldKind::Formula | FieldKind::Rollup | FieldKind::Relation | FieldKind::Unsupported(_)
        )
    }

    /// Short name used in logs and `jobs` output.
    pub fn label(&self) -> &str {
        match self {
            FieldKind::Title => "title",
            FieldKind::Text => "text",
            FieldKind::Number(_) => "number",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select(_) => "select",
            FieldKind::MultiSelect(_) => "multi_select",
            FieldKind::Formula => "formula",
            FieldKind::Rollup => "rollup",
            FieldKind::Relation => "relation",
            FieldKind::Unsupported(name) => name,
        }
    }
}

/// A named, typed field of a record-store database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Field descriptors of one database, in the store's declaration order.
/// Read once per sync and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The (first) title field, if the schema has one.
    pub fn title_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.kind == FieldKind::Title)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Result of a store-side computation (formula or rollup), tagged by the
/// kind the store reports for this particular value.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedValue {
    Number(Option<f64>),
    String(Option<String>),
    Boolean(Option<bool>),
    /// ISO date; only the start of a range is kept.
    Date(Option<String>),
    Array,
    Error(String),
    Unsupported,
}

/// Value of one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain text content of a title or text field.
    Text(String),
    Number(Option<f64>),
    Checkbox(bool),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Computed(ComputedValue),
    Relation(Vec<RecordId>),
}

/// A record as held by the record store. `fields` only contains fields that
/// carry a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Text content of the named title/text field, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One grid cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Textual form of the cell, as a spreadsheet would show an unformatted
    /// value: integral numbers without a fraction, booleans upper-cased.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_plain_number(*n),
            CellValue::Bool(true) => "TRUE".to_owned(),
            CellValue::Bool(false) => "FALSE".to_owned(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

fn format_plain_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// A rectangular-ish view of a grid range: the header row plus data rows.
/// Rows may be ragged; missing trailing cells read as empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Grid {
    pub fn new(header: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { header, rows }
    }

    /// Split raw range rows into header + data rows.
    pub fn from_rows(mut rows: Vec<Vec<CellValue>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0).iter().map(CellValue::as_text).collect();
        Self { header, rows }
    }

    /// Header row followed by the data rows, as they sit in the range.
    pub fn to_rows(&self) -> Vec<Vec<CellValue>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.header.iter().map(|h| CellValue::Text(h.clone())).collect());
        out.extend(self.rows.iter().cloned());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.header.iter().position(|h| h == header)
    }

    /// Index of the reserved `ID` column, if the header carries one.
    pub fn id_column(&self) -> Option<usize> {
        self.column_index(ID_HEADER)
    }

    /// Cell at `(row, col)` in data-row coordinates; empty when out of range.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Strip the override marker from a header, returning the canonical field
/// name and whether the marker was present.
pub fn canonical_header(header: &str) -> (&str, bool) {
    match header.strip_suffix(OVERRIDE_MARKER) {
        Some(stripped) => (stripped, true),
        None => (header, false),
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Which side is the source of truth for a job, and therefore which
/// synchronization protocol runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Record store first, then the grid's computed output flows back.
    RecordAuthoritative,
    /// Grid rows are upserted straight into the record store.
    GridAuthoritative,
    /// Record-authoritative round trip that leaves `[replace]` columns to
    /// manual editing.
    Calculator,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" | "notion" => Ok(Priority::RecordAuthoritative),
            "grid" | "sheet" => Ok(Priority::GridAuthoritative),
            "calculator" => Ok(Priority::Calculator),
            other => Err(format!(
                "unknown priority '{other}'; expected: record, grid, calculator"
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::RecordAuthoritative => write!(f, "record"),
            Priority::GridAuthoritative => write!(f, "grid"),
            Priority::Calculator => write!(f, "calculator"),
        }
    }
}

/// Raw cadence as configured: interval kind (`hour`, `day`, `week`, `month`,
/// `year`) and its interval-specific value string. Parsed at evaluation time
/// so a malformed value only disables the job instead of failing startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cadence {
    pub interval: Option<String>,
    pub value: Option<String>,
}

/// Bookkeeping identity of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub database_id: DatabaseId,
    pub range: RangeRef,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.database_id, self.range)
    }
}

/// One configured grid range ↔ database pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub range: RangeRef,
    pub database_id: DatabaseId,
    pub priority: Priority,
    pub name: Option<String>,
    /// `Some` iff the job repeats on a schedule.
    pub cadence: Option<Cadence>,
}

impl SyncJob {
    pub fn key(&self) -> JobKey {
        JobKey {
            database_id: self.database_id.clone(),
            range: self.range.clone(),
        }
    }

    /// `NAME` when configured, otherwise the range reference.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.range.0)
    }

    pub fn is_repeating(&self) -> bool {
        self.cadence.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(DatabaseId::from("db-1").to_string(), "db-1");
        assert_eq!(RangeRef::from("Tasks!A:E").to_string(), "Tasks!A:E");
        assert_eq!(RecordId::from("r-01").to_string(), "r-01");
    }

    #[test]
    fn sheet_name_from_range() {
        assert_eq!(RangeRef::from("Tasks!A:E").sheet_name(), "Tasks");
        assert_eq!(RangeRef::from("Tasks").sheet_name(), "Tasks");
    }

    #[test]
    fn priority_accepts_legacy_aliases() {
        assert_eq!("notion".parse::<Priority>(), Ok(Priority::RecordAuthoritative));
        assert_eq!("Sheet".parse::<Priority>(), Ok(Priority::GridAuthoritative));
        assert_eq!("calculator".parse::<Priority>(), Ok(Priority::Calculator));
        assert!("both".parse::<Priority>().is_err());
    }

    #[test]
    fn cell_text_forms() {
        assert_eq!(CellValue::Number(3.0).as_text(), "3");
        assert_eq!(CellValue::Number(2.5).as_text(), "2.5");
        assert_eq!(CellValue::Bool(true).as_text(), "TRUE");
        assert!(CellValue::Text(String::new()).is_empty());
    }

    #[test]
    fn grid_from_rows_splits_header() {
        let grid = Grid::from_rows(vec![
            vec!["Title".into(), "ID".into()],
            vec!["Task A".into()],
        ]);
        assert_eq!(grid.header, vec!["Title", "ID"]);
        assert_eq!(grid.id_column(), Some(1));
        assert_eq!(grid.cell(0, 1), &CellValue::Empty);
        assert_eq!(grid.to_rows().len(), 2);
    }

    #[test]
    fn canonical_header_strips_marker() {
        assert_eq!(canonical_header("Rate [replace]"), ("Rate", true));
        assert_eq!(canonical_header("Rate"), ("Rate", false));
    }

    #[test]
    fn job_key_and_display_name() {
        let job = SyncJob {
            range: RangeRef::from("Tasks!A:E"),
            database_id: DatabaseId::from("db"),
            priority: Priority::GridAuthoritative,
            name: None,
            cadence: None,
        };
        assert_eq!(job.key().to_string(), "db-Tasks!A:E");
        assert_eq!(job.display_name(), "Tasks!A:E");
        assert!(!job.is_repeating());
    }
}
