//! `stitch invalidate`: force the next compile of each task to be full.

use crate::pipeline::load_project;
use crate::{GlobalArgs, ModuleArgs};

/// Runs the `stitch invalidate` command.
///
/// Marks each selected task's baseline as failed. Tasks without a baseline
/// are already going to compile fully and are left alone.
pub fn run(args: &ModuleArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global, args.module.as_deref())?;

    let mut invalidated = 0;
    for module in &project.modules {
        for task in &module.tasks {
            if project.store.invalidate(&task.task_key)? {
                invalidated += 1;
                if !global.quiet {
                    eprintln!(" Invalidated {}", task.task_key);
                }
            } else if global.verbose {
                eprintln!("     Skipped {} (no baseline)", task.task_key);
            }
        }
    }

    if !global.quiet {
        eprintln!("    Finished {invalidated} baseline(s) invalidated");
    }
    Ok(0)
}
