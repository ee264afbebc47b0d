//! `sheetsync jobs` — configured jobs and whether their schedules parse.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use sheetsync_core::SyncJob;
use sheetsync_daemon::ScheduleRule;

use super::load_config;

/// Arguments for `sheetsync jobs`.
#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl JobsArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let jobs: Vec<JobLine> = config.jobs.iter().map(JobLine::from_job).collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&jobs).context("failed to serialize jobs JSON")?
            );
            return Ok(());
        }

        print_table(&jobs);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JobLine {
    name: String,
    range: String,
    database_id: String,
    priority: String,
    repeating: bool,
    /// Human description of the cadence, `once` for one-shot jobs.
    schedule: String,
    /// Why the cadence can never fire, if it cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl JobLine {
    fn from_job(job: &SyncJob) -> Self {
        let (schedule, error) = match &job.cadence {
            None => ("once".to_owned(), None),
            Some(cadence) => match ScheduleRule::from_cadence(cadence) {
                Ok(rule) => (rule.to_string(), None),
                Err(err) => ("never".to_owned(), Some(err.to_string())),
            },
        };
        Self {
            name: job.display_name().to_owned(),
            range: job.range.to_string(),
            database_id: job.database_id.to_string(),
            priority: job.priority.to_string(),
            repeating: job.is_repeating(),
            schedule,
            error,
        }
    }
}

#[derive(Tabled)]
struct JobTableRow {
    #[tabled(rename = "job")]
    name: String,
    #[tabled(rename = "range")]
    range: String,
    #[tabled(rename = "priority")]
    priority: String,
    #[tabled(rename = "schedule")]
    schedule: String,
    #[tabled(rename = "status")]
    status: String,
}

fn print_table(jobs: &[JobLine]) {
    if jobs.is_empty() {
        println!("No jobs configured.");
        return;
    }
    let rows: Vec<JobTableRow> = jobs
        .iter()
        .map(|line| JobTableRow {
            name: line.name.clone(),
            range: line.range.clone(),
            priority: line.priority.clone(),
            schedule: line.schedule.clone(),
            status: match &line.error {
                None => "■ ok".green().bold().to_string(),
                Some(reason) => format!("{} {reason}", "■ never fires:".red().bold()),
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
