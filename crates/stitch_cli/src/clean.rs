//! `stitch clean`: delete every stored baseline.

use crate::pipeline::load_project;
use crate::GlobalArgs;

/// Runs the `stitch clean` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global, None)?;
    let removed = project.store.clear()?;
    if !global.quiet {
        eprintln!(
            "     Removed {removed} baseline(s) from {}",
            project.store.dir().display()
        );
    }
    Ok(0)
}
