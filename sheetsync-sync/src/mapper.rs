//! Schema mapper: one value at a time between a record field and a grid cell.
//!
//! | Kind            | grid → record                         | record → grid                  |
//! |-----------------|---------------------------------------|--------------------------------|
//! | title / text    | cell text                             | text                           |
//! | number(format)  | strip decoration, parse; skip on fail | raw number (format via rules)  |
//! | checkbox        | `TRUE`/`FALSE` (any case) or bool     | bool                           |
//! | select          | exact option name, else skip          | option name                    |
//! | multi_select    | comma split, trimmed; `""` clears     | `", "`-joined names            |
//! | formula/rollup  | read-only                             | computed result by result kind |
//! | relation        | read-only                             | related titles, id on failure  |

use std::fmt;

use sheetsync_core::{CellValue, ComputedValue, FieldKind, FieldValue, NumberFormat, RecordId};

use crate::store::RecordStore;

/// Outcome of translating one cell into a field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Value(FieldValue),
    Skip(SkipReason),
}

/// Why a cell did not produce a field value. The rest of the row still
/// applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Field kind only flows record→grid.
    ReadOnly,
    InvalidNumber(String),
    UnknownOption(String),
    InvalidCheckbox(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ReadOnly => write!(f, "read-only field"),
            SkipReason::InvalidNumber(raw) => write!(f, "'{raw}' is not a number"),
            SkipReason::UnknownOption(raw) => write!(f, "'{raw}' is not a select option"),
            SkipReason::InvalidCheckbox(raw) => write!(f, "'{raw}' is not TRUE or FALSE"),
        }
    }
}

// ---------------------------------------------------------------------------
// grid → record
// ---------------------------------------------------------------------------

/// Translate a grid cell into a value for a field of `kind`.
pub fn cell_to_field(kind: &FieldKind, cell: &CellValue) -> Mapped {
    match kind {
        FieldKind::Title | FieldKind::Text => Mapped::Value(FieldValue::Text(cell.as_text())),
        FieldKind::Number(format) => match cell {
            CellValue::Number(n) if n.is_finite() => Mapped::Value(FieldValue::Number(Some(*n))),
            other => {
                let raw = other.as_text();
                match parse_number(&raw, format) {
                    Some(n) => Mapped::Value(FieldValue::Number(Some(n))),
                    None => Mapped::Skip(SkipReason::InvalidNumber(raw)),
                }
            }
        },
        FieldKind::Checkbox => match cell {
            CellValue::Bool(b) => Mapped::Value(FieldValue::Checkbox(*b)),
            other => {
                let raw = other.as_text();
                match raw.to_ascii_uppercase().as_str() {
                    "TRUE" => Mapped::Value(FieldValue::Checkbox(true)),
                    "FALSE" => Mapped::Value(FieldValue::Checkbox(false)),
                    _ => Mapped::Skip(SkipReason::InvalidCheckbox(raw)),
                }
            }
        },
        FieldKind::Select(options) => {
            let raw = cell.as_text();
            if options.iter().any(|o| *o == raw) {
                Mapped::Value(FieldValue::Select(Some(raw)))
            } else {
                Mapped::Skip(SkipReason::UnknownOption(raw))
            }
        }
        FieldKind::MultiSelect(_) => Mapped::Value(FieldValue::MultiSelect(split_tags(
            &cell.as_text(),
        ))),
        FieldKind::Formula | FieldKind::Rollup | FieldKind::Relation | FieldKind::Unsupported(_) => {
            Mapped::Skip(SkipReason::ReadOnly)
        }
    }
}

/// Parse a displayed number, stripping the decoration `format` adds.
///
/// Currency formats lose their symbol and thousands separators, percent
/// formats lose `%` and are scaled by 1/100, everything else loses thousands
/// separators only. Non-finite results are rejected.
pub fn parse_number(raw: &str, format: &NumberFormat) -> Option<f64> {
    let trimmed = raw.trim();
    let (cleaned, scale) = match format {
        NumberFormat::Dollar | NumberFormat::Euro => (
            trimmed.replace(['$', '€', ','], ""),
            1.0,
        ),
        NumberFormat::Percent => (trimmed.replace('%', ""), 100.0),
        _ => (trimmed.replace(',', ""), 1.0),
    };
    let n: f64 = cleaned.trim().parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some(n / scale)
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// record → grid
// ---------------------------------------------------------------------------

/// Translate a field value (absent when the record has none) into a cell.
///
/// Relation ids are resolved to titles through `titles`; a failed lookup
/// falls back to the raw id and never aborts the row.
pub fn field_to_cell(
    kind: &FieldKind,
    value: Option<&FieldValue>,
    titles: &dyn RecordStore,
) -> CellValue {
    let Some(value) = value else {
        return CellValue::Empty;
    };
    match value {
        FieldValue::Text(s) => CellValue::Text(s.clone()),
        FieldValue::Number(Some(n)) => CellValue::Number(*n),
        FieldValue::Number(None) => CellValue::Empty,
        FieldValue::Checkbox(b) => CellValue::Bool(*b),
        FieldValue::Select(Some(name)) => CellValue::Text(name.clone()),
        FieldValue::Select(None) => CellValue::Empty,
        FieldValue::MultiSelect(names) => CellValue::Text(names.join(", ")),
        FieldValue::Computed(computed) => computed_to_cell(kind, computed),
        FieldValue::Relation(ids) => {
            if ids.is_empty() {
                return CellValue::Empty;
            }
            let resolved: Vec<String> = ids.iter().map(|id| resolve_title(id, titles)).collect();
            CellValue::Text(resolved.join(", "))
        }
    }
}

fn resolve_title(id: &RecordId, titles: &dyn RecordStore) -> String {
    match titles.get_record_title(id) {
        Ok(title) => title,
        Err(err) => {
            tracing::warn!("could not retrieve title for related record {id}: {err}");
            id.0.clone()
        }
    }
}

fn computed_to_cell(kind: &FieldKind, computed: &ComputedValue) -> CellValue {
    let label = match kind {
        FieldKind::Rollup => "Rollup",
        _ => "Formula",
    };
    match computed {
        ComputedValue::Number(Some(n)) => CellValue::Number(*n),
        ComputedValue::Number(None) => CellValue::Text("[Null Number]".into()),
        ComputedValue::String(Some(s)) => CellValue::Text(s.clone()),
        ComputedValue::Boolean(Some(b)) => CellValue::Bool(*b),
        ComputedValue::Date(Some(start)) => CellValue::Text(start.clone()),
        ComputedValue::String(None) | ComputedValue::Boolean(None) | ComputedValue::Date(None) => {
            CellValue::Empty
        }
        ComputedValue::Array => CellValue::Text(format!("[{label} Array]")),
        ComputedValue::Error(message) => CellValue::Text(format!("[{label} Error: {message}]")),
        ComputedValue::Unsupported => CellValue::Text(format!("[Unsupported {label} Result]")),
    }
}

// ---------------------------------------------------------------------------
// Display patterns
// ---------------------------------------------------------------------------

/// Grid number-format pattern for a field format.
pub fn display_pattern(format: &NumberFormat) -> &'static str {
    match format {
        NumberFormat::Number | NumberFormat::NumberWithCommas => "#,##0.0000",
        NumberFormat::Percent => "0.0000%",
        NumberFormat::Dollar => "$#,##0.0000",
        NumberFormat::Euro => "€#,##0.0000",
        NumberFormat::Other(_) => "0.0000",
    }
}

/// Text the grid shows for `value` under [`display_pattern`]`(format)`.
pub fn render_number(value: f64, format: &NumberFormat) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    match format {
        NumberFormat::Number | NumberFormat::NumberWithCommas => {
            format!("{sign}{}", group_thousands(magnitude))
        }
        NumberFormat::Percent => format!("{sign}{:.4}%", magnitude * 100.0),
        NumberFormat::Dollar | NumberFormat::Euro => {
            let symbol = format.currency_symbol().unwrap_or('$');
            format!("{sign}{symbol}{}", group_thousands(magnitude))
        }
        NumberFormat::Other(_) => format!("{sign}{magnitude:.4}"),
    }
}

fn group_thousands(magnitude: f64) -> String {
    let fixed = format!("{magnitude:.4}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "0000"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped}.{frac_part}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
