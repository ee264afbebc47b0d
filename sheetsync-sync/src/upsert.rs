//! Upsert resolution: grid rows in, minimal create/update decisions out.
//!
//! Planning is pure ([`plan_upserts`]); [`UpsertResolver`] adds the record
//! fetch in front and the store writes behind it.
//!
//! Rows are resolved last-to-first. When several rows share an identity key
//! the earliest row in grid order is applied last, so its values are the ones
//! the record ends up with. Each key keeps a projection of the values already
//! planned for it, which keeps the plan minimal and lets duplicate titles fold
//! into a single create.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use sheetsync_core::types::canonical_header;
use sheetsync_core::{DatabaseId, FieldValue, Grid, Record, RecordId, Schema};

use crate::mapper::{cell_to_field, Mapped, SkipReason};
use crate::store::{RecordStore, StoreError};

// ---------------------------------------------------------------------------
// 1. Plan types
// ---------------------------------------------------------------------------

/// How rows are matched to records; fixed for one reconciliation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// The header has an `ID` column; rows match by record id and never
    /// create records.
    ById { column: usize },
    /// Rows match by the text in `column` against each record's `field`.
    /// `column` is where `field` sits in the header.
    ByTitle { field: String, column: usize },
}

impl IdentityStrategy {
    /// Pick the strategy for a header row.
    pub fn for_grid(grid: &Grid, schema: &Schema) -> Self {
        match grid.id_column() {
            Some(column) => IdentityStrategy::ById { column },
            None => {
                let title_column = schema.title_field().and_then(|title| {
                    grid.header
                        .iter()
                        .position(|h| canonical_header(h).0 == title.name)
                        .map(|column| (title.name.clone(), column))
                });
                let (field, column) = title_column.unwrap_or_else(|| {
                    let first = grid.header.first().map(|h| canonical_header(h).0);
                    (first.unwrap_or_default().to_owned(), 0)
                });
                IdentityStrategy::ByTitle { field, column }
            }
        }
    }
}

/// Why a whole row produced no write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    /// First cell empty; never creates a titleless record.
    EmptyTitle,
    MissingId,
    /// `ID` present but no such record; ids are never invented.
    UnknownId(String),
    /// Record already holds these values.
    Unchanged(RecordId),
    /// Same title as a row already planned for creation; folded into it.
    MergedIntoCreate,
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkip::EmptyTitle => write!(f, "empty title"),
            RowSkip::MissingId => write!(f, "empty ID cell"),
            RowSkip::UnknownId(id) => write!(f, "no record with id {id}"),
            RowSkip::Unchanged(id) => write!(f, "record {id} unchanged"),
            RowSkip::MergedIntoCreate => write!(f, "duplicate title, merged into pending create"),
        }
    }
}

/// One planned record-store operation. `row` is the 0-based data row it
/// came from.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOp {
    Create {
        row: usize,
        fields: BTreeMap<String, FieldValue>,
    },
    Update {
        row: usize,
        record_id: RecordId,
        fields: BTreeMap<String, FieldValue>,
    },
    Skip {
        row: usize,
        reason: RowSkip,
    },
}

/// A cell that did not make it into its row's field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSkip {
    pub row: usize,
    pub field: String,
    pub reason: SkipReason,
}

/// Everything one reconciliation decided, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan {
    pub strategy: IdentityStrategy,
    pub ops: Vec<UpsertOp>,
    pub field_skips: Vec<FieldSkip>,
}

impl UpsertPlan {
    pub fn creates(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, UpsertOp::Create { .. })).count()
    }

    pub fn updates(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, UpsertOp::Update { .. })).count()
    }

    pub fn skips(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, UpsertOp::Skip { .. })).count()
    }
}

/// Counts after a plan has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub field_skips: usize,
}

// ---------------------------------------------------------------------------
// 2. Planning
// ---------------------------------------------------------------------------

/// Plan the upserts for `grid` against the current `records`.
///
/// `excluded` holds column indices that must not contribute fields (the `ID`
/// column is always excluded).
pub fn plan_upserts(
    grid: &Grid,
    records: &[Record],
    schema: &Schema,
    excluded: &BTreeSet<usize>,
) -> UpsertPlan {
    let strategy = IdentityStrategy::for_grid(grid, schema);

    // Later duplicates overwrite earlier ones, as with any keyed index built
    // in store order.
    let mut index: HashMap<String, &Record> = HashMap::new();
    for record in records {
        let key = match &strategy {
            IdentityStrategy::ById { .. } => Some(record.id.0.clone()),
            IdentityStrategy::ByTitle { field, .. } => record.text(field).map(str::to_owned),
        };
        if let Some(key) = key {
            index.insert(key, record);
        }
    }

    let mut ops = Vec::new();
    let mut field_skips = Vec::new();
    let mut projected: HashMap<RecordId, BTreeMap<String, FieldValue>> = HashMap::new();
    let mut pending_creates: HashMap<String, usize> = HashMap::new();

    for row in (0..grid.rows.len()).rev() {
        let title = grid.cell(row, 0).as_text();
        if title.is_empty() {
            tracing::debug!("row {row}: skipped, empty title");
            ops.push(UpsertOp::Skip {
                row,
                reason: RowSkip::EmptyTitle,
            });
            continue;
        }

        let fields = candidate_fields(grid, row, schema, &strategy, excluded, &mut field_skips);

        let key = match &strategy {
            IdentityStrategy::ById { column } => {
                let id = grid.cell(row, *column).as_text();
                if id.is_empty() {
                    ops.push(UpsertOp::Skip {
                        row,
                        reason: RowSkip::MissingId,
                    });
                    continue;
                }
                id
            }
            IdentityStrategy::ByTitle { column, .. } => {
                let title = grid.cell(row, *column).as_text();
                if title.is_empty() {
                    ops.push(UpsertOp::Skip {
                        row,
                        reason: RowSkip::EmptyTitle,
                    });
                    continue;
                }
                title
            }
        };

        if let Some(existing) = index.get(&key) {
            let projection = projected
                .entry(existing.id.clone())
                .or_insert_with(|| existing.fields.clone());
            if fields_differ(&fields, projection) {
                tracing::debug!("row {row}: update {}", existing.id);
                projection.extend(fields.clone());
                ops.push(UpsertOp::Update {
                    row,
                    record_id: existing.id.clone(),
                    fields,
                });
            } else {
                ops.push(UpsertOp::Skip {
                    row,
                    reason: RowSkip::Unchanged(existing.id.clone()),
                });
            }
            continue;
        }

        match &strategy {
            IdentityStrategy::ById { .. } => {
                tracing::debug!("row {row}: no record with id {key}");
                ops.push(UpsertOp::Skip {
                    row,
                    reason: RowSkip::UnknownId(key),
                });
            }
            IdentityStrategy::ByTitle { .. } => {
                if let Some(&at) = pending_creates.get(&key) {
                    if let UpsertOp::Create { fields: pending, .. } = &mut ops[at] {
                        pending.extend(fields);
                    }
                    ops.push(UpsertOp::Skip {
                        row,
                        reason: RowSkip::MergedIntoCreate,
                    });
                } else {
                    tracing::debug!("row {row}: create '{key}'");
                    pending_creates.insert(key, ops.len());
                    ops.push(UpsertOp::Create { row, fields });
                }
            }
        }
    }

    UpsertPlan {
        strategy,
        ops,
        field_skips,
    }
}

fn candidate_fields(
    grid: &Grid,
    row: usize,
    schema: &Schema,
    strategy: &IdentityStrategy,
    excluded: &BTreeSet<usize>,
    field_skips: &mut Vec<FieldSkip>,
) -> BTreeMap<String, FieldValue> {
    let id_column = match strategy {
        IdentityStrategy::ById { column } => Some(*column),
        IdentityStrategy::ByTitle { .. } => None,
    };

    let mut fields = BTreeMap::new();
    for (col, header) in grid.header.iter().enumerate() {
        if Some(col) == id_column || excluded.contains(&col) {
            continue;
        }
        let (name, _) = canonical_header(header);
        let Some(descriptor) = schema.get(name) else {
            continue;
        };
        if descriptor.kind.is_read_only() {
            continue;
        }
        match cell_to_field(&descriptor.kind, grid.cell(row, col)) {
            Mapped::Value(value) => {
                fields.insert(name.to_owned(), value);
            }
            Mapped::Skip(reason) => {
                tracing::warn!("row {row}: skipping field '{name}': {reason}");
                field_skips.push(FieldSkip {
                    row,
                    field: name.to_owned(),
                    reason,
                });
            }
        }
    }
    fields
}

// ---------------------------------------------------------------------------
// 3. Difference test
// ---------------------------------------------------------------------------

/// `true` if any proposed value differs from (or is absent in) `existing`.
pub fn fields_differ(
    proposed: &BTreeMap<String, FieldValue>,
    existing: &BTreeMap<String, FieldValue>,
) -> bool {
    proposed.iter().any(|(name, value)| match existing.get(name) {
        Some(current) => !values_equal(value, current),
        None => true,
    })
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Number(Some(x)), FieldValue::Number(Some(y))) => {
            let scale = x.abs().max(y.abs()).max(1.0);
            (x - y).abs() <= scale * 1e-12
        }
        (FieldValue::MultiSelect(x), FieldValue::MultiSelect(y)) => {
            x.iter().collect::<BTreeSet<_>>() == y.iter().collect::<BTreeSet<_>>()
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// 4. Resolver
// ---------------------------------------------------------------------------

/// Fetches the current record set, plans, and applies plans to one store.
pub struct UpsertResolver<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> UpsertResolver<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Plan the upserts for `grid` against a fresh read of the database.
    pub fn reconcile(
        &self,
        database_id: &DatabaseId,
        grid: &Grid,
        schema: &Schema,
        excluded: &BTreeSet<usize>,
    ) -> Result<UpsertPlan, StoreError> {
        let records = self.store.query_all(database_id)?;
        Ok(plan_upserts(grid, &records, schema, excluded))
    }

    /// Issue the plan's creates and updates in order.
    pub fn apply(
        &self,
        database_id: &DatabaseId,
        plan: &UpsertPlan,
    ) -> Result<UpsertSummary, StoreError> {
        let mut summary = UpsertSummary {
            field_skips: plan.field_skips.len(),
            ..UpsertSummary::default()
        };
        for op in &plan.ops {
            match op {
                UpsertOp::Create { row, fields } => {
                    let id = self.store.create_record(database_id, fields)?;
                    tracing::info!("created record {id} from row {row}");
                    summary.created += 1;
                }
                UpsertOp::Update {
                    row,
                    record_id,
                    fields,
                } => {
                    self.store.update_record(record_id, fields)?;
                    tracing::info!("updated record {record_id} from row {row}");
                    summary.updated += 1;
                }
                UpsertOp::Skip { .. } => summary.skipped += 1,
            }
        }
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
