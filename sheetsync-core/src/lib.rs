//! sheetsync core library — data model shared by the engine, the scheduler
//! and the CLI, plus configuration loading.
//!
//! - [`types`] — newtypes, field kinds/values, grid cells, sync jobs
//! - [`config`] — load / validate the job configuration file
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{
    Cadence, CellValue, ComputedValue, DatabaseId, FieldDescriptor, FieldKind, FieldValue, Grid,
    JobKey, NumberFormat, Priority, RangeRef, Record, RecordId, Schema, SyncJob,
};
