//! `sheetsync run` — initial pass, then the polling scheduler.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use sheetsync_daemon::{start_blocking, ErrorSink, RunExit};

use super::{error_sink, load_config, orchestrator};

/// Arguments for `sheetsync run`.
#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let runner = Arc::new(orchestrator(&config)?);
        let sink: Arc<dyn ErrorSink> = Arc::new(error_sink()?);

        let repeating = config.jobs.iter().filter(|j| j.is_repeating()).count();
        println!(
            "[{}] Loaded {} job(s), {repeating} on a schedule.",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            config.jobs.len()
        );

        match start_blocking(config.jobs, runner, sink).context("scheduler failed")? {
            RunExit::OneShot => println!("No repeating jobs configured. Exiting."),
            RunExit::Interrupted => println!("Scheduler stopped by user. Exiting."),
            RunExit::TickerStopped => {}
        }
        Ok(())
    }
}
