//! Formula guard: keeps grid writes off live formula cells and override
//! columns.
//!
//! Coordinates are range-relative with the header at row 0, the same layout
//! as the payload handed to [`GridStore::write_range`](crate::store::GridStore::write_range).

use std::collections::BTreeSet;

use sheetsync_core::types::{canonical_header, FORMULA_SENTINEL};
use sheetsync_core::{CellValue, Grid};

use crate::store::WriteRows;

/// Cells (and whole columns) that one grid write must leave untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteMask {
    cells: BTreeSet<(usize, usize)>,
    columns: BTreeSet<usize>,
}

impl WriteMask {
    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.columns.contains(&col) || self.cells.contains(&(row, col))
    }

    /// Exclude every data row of `col` (the header cell stays writable).
    pub fn exclude_column(&mut self, col: usize) {
        self.columns.insert(col);
    }

    /// Number of individually masked formula cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.columns.is_empty()
    }

    pub fn excluded_columns(&self) -> &BTreeSet<usize> {
        &self.columns
    }

    /// Turn full rows into a write payload with `None` at every masked
    /// coordinate. Header row (index 0) is only masked cell by cell.
    pub fn apply(&self, rows: Vec<Vec<CellValue>>) -> WriteRows {
        rows.into_iter()
            .enumerate()
            .map(|(r, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(c, cell)| {
                        let column_masked = r > 0 && self.columns.contains(&c);
                        if column_masked || self.cells.contains(&(r, c)) {
                            None
                        } else {
                            Some(cell)
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Mask every cell whose raw (formula-rendered) text starts with `=`.
///
/// Must be computed from a fresh read right before the write it protects.
pub fn compute_write_mask(formula_view: &Grid) -> WriteMask {
    let mut mask = WriteMask::default();
    for (c, header) in formula_view.header.iter().enumerate() {
        if header.starts_with(FORMULA_SENTINEL) {
            mask.cells.insert((0, c));
        }
    }
    for (r, row) in formula_view.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let CellValue::Text(raw) = cell {
                if raw.starts_with(FORMULA_SENTINEL) {
                    mask.cells.insert((r + 1, c));
                }
            }
        }
    }
    mask
}

/// Indices of header cells carrying the override marker.
pub fn override_columns(header: &[String]) -> BTreeSet<usize> {
    header
        .iter()
        .enumerate()
        .filter(|(_, h)| canonical_header(h).1)
        .map(|(i, _)| i)
        .collect()
}
