//! `sheetsync plan <job>` — dry run: planned record operations and the grid
//! diff, nothing written.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sheetsync_core::FieldValue;
use sheetsync_sync::diff::{plan_job, JobPlan};
use sheetsync_sync::upsert::IdentityStrategy;
use sheetsync_sync::UpsertOp;

use super::{find_job, load_config, orchestrator};

/// Arguments for `sheetsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Job `NAME`, or its `RANGE` when the job has no name.
    pub job: String,
}

impl PlanArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let job = find_job(&config, &self.job)?;
        let orchestrator = orchestrator(&config)?;

        let plan = plan_job(&orchestrator, job)
            .with_context(|| format!("plan failed for '{}'", self.job))?;
        print_plan(&plan);
        Ok(())
    }
}

fn print_plan(plan: &JobPlan) {
    let identity = match &plan.upsert.strategy {
        IdentityStrategy::ById { .. } => "by ID column".to_owned(),
        IdentityStrategy::ByTitle { field, .. } => format!("by title field '{field}'"),
    };
    println!("Plan for '{}' (rows matched {identity})", plan.job);

    if let Some(diff) = &plan.grid_diff {
        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
    }

    let upsert = &plan.upsert;
    if upsert.ops.is_empty() {
        println!("No record changes.");
    }
    for op in &upsert.ops {
        match op {
            UpsertOp::Create { row, fields } => {
                println!("  {} data row {}: {}", "+ create".green(), row + 1, fields_line(fields));
            }
            UpsertOp::Update {
                row,
                record_id,
                fields,
            } => println!(
                "  {} data row {} → {record_id}: {}",
                "~ update".yellow(),
                row + 1,
                fields_line(fields)
            ),
            UpsertOp::Skip { row, reason } => {
                println!("  {} data row {}: {reason}", "· skip".dimmed(), row + 1);
            }
        }
    }
    for skip in &upsert.field_skips {
        println!(
            "  {} data row {} field '{}': {}",
            "!".yellow().bold(),
            skip.row + 1,
            skip.field,
            skip.reason
        );
    }
    println!(
        "{} create(s), {} update(s), {} skip(s)",
        upsert.creates(),
        upsert.updates(),
        upsert.skips()
    );
}

fn fields_line(fields: &std::collections::BTreeMap<String, FieldValue>) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{name}={}", describe(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => format!("{s:?}"),
        FieldValue::Number(Some(n)) => n.to_string(),
        FieldValue::Number(None) => "empty".to_owned(),
        FieldValue::Checkbox(b) => b.to_string(),
        FieldValue::Select(Some(s)) => format!("{s:?}"),
        FieldValue::Select(None) => "none".to_owned(),
        FieldValue::MultiSelect(items) => format!("[{}]", items.join(", ")),
        FieldValue::Computed(_) | FieldValue::Relation(_) => "(read-only)".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_are_described_compactly() {
        let fields = std::collections::BTreeMap::from([
            ("Done".to_string(), FieldValue::Checkbox(true)),
            ("Tags".to_string(), FieldValue::MultiSelect(vec!["a".into(), "b".into()])),
            ("Title".to_string(), FieldValue::Text("Task A".into())),
        ]);
        assert_eq!(fields_line(&fields), r#"Done=true, Tags=[a, b], Title="Task A""#);
    }
}
