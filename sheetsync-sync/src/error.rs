//! Error types for sheetsync-sync.

use thiserror::Error;

use crate::store::StoreError;

/// All errors that can abort one job's protocol run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A grid or record store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The range names a sheet the grid store does not have.
    #[error("sheet '{sheet}' not found")]
    SheetNotFound { sheet: String },

    /// The record store reported a database without fields.
    #[error("database {database_id} has no fields")]
    EmptySchema { database_id: String },
}
