//! `stitch status`: change detection without compiling.
//!
//! Fingerprints every selected task's inputs, compares them against the
//! stored baselines and prints the decision. Nothing is written.

use serde::Serialize;
use stitch_cache::{detect, Decision};
use stitch_compile::CompileTask;

use crate::pipeline::load_project;
use crate::{GlobalArgs, ReportFormat, StatusArgs};

/// The decision for one task.
#[derive(Debug, Serialize)]
pub struct TaskStatus {
    /// Owning module.
    pub module: String,
    /// History key of the task.
    pub task: String,
    /// What the next compile would do.
    pub decision: Decision,
}

/// Runs the `stitch status` command.
pub fn run(args: &StatusArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global, args.module.as_deref())?;

    let mut statuses = Vec::new();
    for module in &project.modules {
        for resolved in &module.tasks {
            let task = CompileTask::from_resolved(resolved);
            let detection = detect(&project.store, &task.inputs)?;
            statuses.push(TaskStatus {
                module: module.name.clone(),
                task: detection.task_key,
                decision: detection.decision,
            });
        }
    }

    match args.format {
        ReportFormat::Text => {
            for status in &statuses {
                println!("{}", render_text(status));
            }
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
    }
    Ok(0)
}

/// Renders one status as a single line of text.
fn render_text(status: &TaskStatus) -> String {
    match &status.decision {
        Decision::Skip => format!("{}: up to date", status.task),
        Decision::Full(reason) => format!("{}: full compile ({reason})", status.task),
        Decision::Incremental(changes) => {
            let count = |pick: fn(&stitch_cache::ChangeSet) -> usize| -> usize {
                changes.iter().map(pick).sum()
            };
            format!(
                "{}: incremental ({} added, {} modified, {} removed)",
                status.task,
                count(|c| c.added.len()),
                count(|c| c.modified.len()),
                count(|c| c.removed.len()),
            )
        }
    }
}
