//! sheetsync — keep spreadsheet ranges and Notion databases in step.
//!
//! # Usage
//!
//! ```text
//! sheetsync [--config <path>] run
//! sheetsync [--config <path>] sync <job>
//! sheetsync [--config <path>] jobs [--json]
//! sheetsync [--config <path>] plan <job>
//! ```

mod commands;
mod remote;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{jobs::JobsArgs, plan::PlanArgs, run::RunArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sheetsync",
    version,
    about = "Synchronize Google Sheets ranges with Notion databases",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to $SHEETSYNC_CONFIG, then ./config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one-shot jobs, then poll repeating jobs until interrupted.
    Run(RunArgs),

    /// Run a single job now.
    Sync(SyncArgs),

    /// List configured jobs and their schedules.
    Jobs(JobsArgs),

    /// Show what a job would change without writing anything.
    Plan(PlanArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    sheetsync_daemon::init_tracing();
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Jobs(args) => args.run(config),
        Commands::Plan(args) => args.run(config),
    }
}
