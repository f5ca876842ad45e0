//! `stitch compile`: bring compiled outputs up to date.
//!
//! Modules compile concurrently. Within a module, tasks run in the order the
//! module lists its compilers. A failing module does not stop the others.

use rayon::prelude::*;
use stitch_compile::CompileOrchestrator;

use crate::pipeline::{compile_module, load_project, print_task_result};
use crate::{GlobalArgs, ModuleArgs};

/// Runs the `stitch compile` command.
///
/// Returns exit code 0 if every module compiled, 1 otherwise.
pub fn run(args: &ModuleArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global, args.module.as_deref())?;
    if !global.quiet {
        eprintln!(
            "   Compiling {} v{} ({} module(s))",
            project.config.project.name,
            project.config.project.version,
            project.modules.len()
        );
    }

    let orchestrator = CompileOrchestrator::new(project.store.clone());
    let results: Vec<_> = project
        .modules
        .par_iter()
        .map(|module| (module, compile_module(&orchestrator, module)))
        .collect();

    let mut failed = 0;
    for (module, result) in &results {
        match result {
            Ok(tasks) => {
                if global.quiet {
                    continue;
                }
                for task in tasks {
                    print_task_result(task, global.verbose);
                    for output in &task.outcome.outputs {
                        println!("{}", output.display());
                    }
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("error: module '{}' failed: {e}", module.name);
            }
        }
    }

    if failed > 0 {
        eprintln!("error: {failed} module(s) failed to compile");
        return Ok(1);
    }
    if !global.quiet {
        eprintln!("    Finished compiling");
    }
    Ok(0)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::tests::{global_for, write_project};
    use crate::pipeline::TOOL_VERSION;
    use stitch_cache::HistoryStore;

    #[test]
    fn compile_records_baselines() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), "");
        let global = global_for(dir.path());

        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);
        assert!(dir.path().join("app/build/classes/Main.class").exists());
        assert!(dir.path().join("login/build/classes/Main.class").exists());

        let store = HistoryStore::open(&dir.path().join(".stitch/history"), TOOL_VERSION);
        assert!(store.get(":app:compileJava").unwrap().is_some());
        assert!(store.get(":login:compileJava").unwrap().is_some());
    }

    #[test]
    fn failing_compiler_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), "");
        let config = dir.path().join("stitch.toml");
        let text = std::fs::read_to_string(&config).unwrap();
        std::fs::write(&config, text.replace("do b=", "do exit 1; b=")).unwrap();

        assert_eq!(run(&ModuleArgs { module: None }, &global_for(dir.path())).unwrap(), 1);
        let store = HistoryStore::open(&dir.path().join(".stitch/history"), TOOL_VERSION);
        assert!(store.get(":app:compileJava").unwrap().is_none());
    }
}
