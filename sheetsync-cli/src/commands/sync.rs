//! `sheetsync sync <job>` — run one job immediately.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sheetsync_daemon::{ErrorEntry, ErrorSink};
use sheetsync_sync::JobReport;

use super::{error_sink, find_job, load_config, orchestrator};

/// Arguments for `sheetsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Job `NAME`, or its `RANGE` when the job has no name.
    pub job: String,

    /// Emit the job report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let job = find_job(&config, &self.job)?;
        let orchestrator = orchestrator(&config)?;

        let report = match orchestrator.run_job(job) {
            Ok(report) => report,
            Err(err) => {
                error_sink()?.record(&ErrorEntry::for_job(job, err.to_string()));
                return Err(err).with_context(|| format!("sync failed for '{}'", self.job));
            }
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &JobReport) {
    println!(
        "{} '{}' synced ({})",
        "✓".green().bold(),
        report.job,
        report.priority
    );
    if report.rows_written > 0 {
        println!(
            "  grid: {} row(s) written, {} formula cell(s) preserved, {} formatting rule(s)",
            report.rows_written, report.cells_masked, report.formatting_rules
        );
    }
    let upsert = &report.upsert;
    println!(
        "  records: {} created, {} updated, {} skipped",
        upsert.created, upsert.updated, upsert.skipped
    );
    if upsert.field_skips > 0 {
        println!(
            "  {} {} field value(s) could not be converted; see the log",
            "!".yellow().bold(),
            upsert.field_skips
        );
    }
}
