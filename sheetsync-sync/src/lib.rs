//! # sheetsync-sync
//!
//! Reconciliation engine between a grid store and a record store.
//!
//! - [`mapper`] converts single values between field kinds and grid cells
//! - [`guard`] keeps writes away from live formula cells
//! - [`upsert`] turns grid rows into create/update decisions
//! - [`pipeline`] sequences the three into the per-job sync protocols
//! - [`diff`] previews a job without writing anything
//!
//! Stores are reached only through the traits in [`store`]; [`memory`]
//! provides in-process implementations.

pub mod diff;
pub mod error;
pub mod guard;
pub mod mapper;
pub mod memory;
pub mod pipeline;
pub mod store;
pub mod upsert;

pub use error::SyncError;
pub use pipeline::{JobReport, SettleTimer, SyncOrchestrator, ThreadSettle};
pub use store::{GridStore, RecordStore, StoreError};
pub use upsert::{UpsertOp, UpsertPlan, UpsertSummary};
