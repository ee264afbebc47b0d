pub mod jobs;
pub mod plan;
pub mod run;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use sheetsync_core::{config, Config, SyncJob};
use sheetsync_daemon::{paths, FileErrorSink};
use sheetsync_sync::SyncOrchestrator;

use crate::remote::{NotionStore, SheetsStore};

/// Load the configuration from `--config`, `$SHEETSYNC_CONFIG` or
/// `./config.json`, in that order.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_path);
    config::load_at(&path)
        .with_context(|| format!("could not load configuration from {}", path.display()))
}

pub(crate) fn find_job<'a>(config: &'a Config, name: &str) -> Result<&'a SyncJob> {
    config
        .find_job(name)
        .with_context(|| format!("no job named '{name}' (jobs match by NAME or RANGE)"))
}

/// Orchestrator wired to the live Notion and Google Sheets APIs.
pub(crate) fn orchestrator(config: &Config) -> Result<SyncOrchestrator> {
    let token = config.grid_store_token.clone().with_context(|| {
        format!(
            "no Google access token: set GOOGLE_ACCESS_TOKEN in the configuration or the {} environment variable",
            config::GOOGLE_TOKEN_ENV
        )
    })?;
    let records = Arc::new(NotionStore::new(config.record_store_token.clone()));
    let grid = Arc::new(SheetsStore::new(config.spreadsheet_id.clone(), token));
    Ok(SyncOrchestrator::new(records, grid).with_settle_delay(config.settle_delay))
}

pub(crate) fn error_sink() -> Result<FileErrorSink> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    Ok(FileErrorSink::new(paths::error_log_path(&home)))
}
