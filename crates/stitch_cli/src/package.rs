//! `stitch package`: compile, package and merge every selected module.
//!
//! Each module compiles its changed sources, packages the fresh outputs into
//! a fragment and reports to one shared [`Rendezvous`]. The module whose
//! report completes the cycle merges all fragments. A module that fails to
//! compile or package never reports, so no partial merge happens.
//!
//! The rendezvous lives only as long as the process, so an incomplete cycle
//! invalidates every selected baseline. The next run compiles and packages
//! every module in full instead of merging a subset.

use std::path::PathBuf;

use rayon::prelude::*;
use stitch_cache::{HistoryStore, StorageError};
use stitch_compile::CompileOrchestrator;
use stitch_config::{resolve_packager, ResolvedModule, ResolvedPackager};
use stitch_package::{package_module, ProcessPackager, Rendezvous, ReportOutcome};

use crate::pipeline::{compile_module, load_project, print_task_result};
use crate::{GlobalArgs, ModuleArgs};

type ModuleError = Box<dyn std::error::Error + Send + Sync>;

/// Runs the `stitch package` command.
///
/// Returns exit code 0 if every module reported and the cycle completed,
/// 1 otherwise.
pub fn run(args: &ModuleArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global, args.module.as_deref())?;
    let packager = resolve_packager(&project.config, &project.root)?;
    if !global.quiet {
        eprintln!(
            "   Packaging {} v{} ({} module(s))",
            project.config.project.name,
            project.config.project.version,
            project.modules.len()
        );
    }

    let orchestrator = CompileOrchestrator::new(project.store.clone());
    let rendezvous = Rendezvous::new(
        project.modules.len(),
        Box::new(ProcessPackager::from_resolved(&packager)),
        packager.merged_dir.clone(),
    );

    let results: Vec<_> = project
        .modules
        .par_iter()
        .map(|module| {
            let result = build_module(&orchestrator, &packager, &rendezvous, module, global);
            (module, result)
        })
        .collect();

    let mut failed = 0;
    let mut merged: Option<PathBuf> = None;
    let mut completed = false;
    for (module, result) in results {
        match result {
            Ok(ReportOutcome::Merged(path)) => {
                completed = true;
                merged = Some(path);
            }
            Ok(ReportOutcome::NothingToMerge) => completed = true,
            Ok(ReportOutcome::Pending { .. }) => {}
            Ok(ReportOutcome::Rejected) => {
                failed += 1;
                eprintln!("error: module '{}' report was rejected", module.name);
            }
            Err(e) => {
                failed += 1;
                eprintln!("error: module '{}' failed: {e}", module.name);
            }
        }
    }

    if failed > 0 {
        eprintln!(
            "error: {failed} of {} module(s) failed, nothing was merged",
            rendezvous.expected()
        );
        invalidate_modules(&project.store, &project.modules)?;
        return Ok(1);
    }
    if !completed {
        eprintln!(
            "error: only {} of {} module(s) reported",
            rendezvous.reported(),
            rendezvous.expected()
        );
        invalidate_modules(&project.store, &project.modules)?;
        return Ok(1);
    }

    match merged {
        Some(path) => {
            if !global.quiet {
                eprintln!("      Merged {}", path.display());
            }
            println!("{}", path.display());
        }
        None => {
            if !global.quiet {
                eprintln!("    Finished nothing to merge");
            }
        }
    }
    Ok(0)
}

/// Marks every task baseline of `modules` as failed.
fn invalidate_modules(store: &HistoryStore, modules: &[ResolvedModule]) -> Result<(), StorageError> {
    for module in modules {
        for task in &module.tasks {
            if store.invalidate(&task.task_key)? {
                tracing::info!("{} baseline invalidated, next package rebuilds fully", task.task_key);
            }
        }
    }
    Ok(())
}

/// Compiles and packages one module, then reports its fragment.
fn build_module(
    orchestrator: &CompileOrchestrator,
    packager: &ResolvedPackager,
    rendezvous: &Rendezvous,
    module: &ResolvedModule,
    global: &GlobalArgs,
) -> Result<ReportOutcome, ModuleError> {
    let tasks = compile_module(orchestrator, module)?;
    let outputs: Vec<PathBuf> = tasks
        .iter()
        .flat_map(|t| t.outcome.outputs.iter().cloned())
        .collect();
    if !global.quiet {
        for task in &tasks {
            print_task_result(task, global.verbose);
        }
    }

    let tool = ProcessPackager::from_resolved(packager);
    let artifact = package_module(
        &tool,
        &module.name,
        &outputs,
        &packager.fragment_dir_for(module),
    )?;
    Ok(rendezvous.report(&module.name, artifact.artifact)?)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::tests::{global_for, write_project};
    use crate::pipeline::TOOL_VERSION;
    use stitch_cache::Outcome;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Installs a fake packaging tool that concatenates its inputs.
    fn install_packager(root: &Path) -> String {
        install_script(root, "")
    }

    /// Like [`install_packager`], but merges fail while `<root>/fail-merge` exists.
    fn install_flaky_packager(root: &Path) -> String {
        let guard = format!(
            "case \"$dest\" in */merged) [ -e \"{}\" ] && exit 1;; esac\n",
            root.join("fail-merge").display()
        );
        install_script(root, &guard)
    }

    fn install_script(root: &Path, guard: &str) -> String {
        let path = root.join("fake-d8");
        std::fs::write(
            &path,
            format!("#!/bin/sh\ndest=$2\nshift 2\n{guard}cat \"$@\" > \"$dest/classes.dex\"\n"),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        format!("\n[packager]\nprogram = \"{}\"\n", path.display())
    }

    /// Makes the project compiler fail on empty source files.
    fn fail_on_empty_sources(root: &Path) {
        let config = root.join("stitch.toml");
        let text = std::fs::read_to_string(&config).unwrap();
        std::fs::write(
            &config,
            text.replace("do b=", "do [ -s \\\"$f\\\" ] || exit 1; b="),
        )
        .unwrap();
    }

    fn merged(root: &Path) -> PathBuf {
        root.join("build/outputs/merged/classes.dex")
    }

    #[test]
    fn package_merges_all_modules() {
        let dir = tempfile::tempdir().unwrap();
        let packager = install_packager(dir.path());
        write_project(dir.path(), &packager);

        let global = global_for(dir.path());
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);

        let merged = dir.path().join("build/outputs/merged/classes.dex");
        let text = std::fs::read_to_string(merged).unwrap();
        assert!(text.contains("/* app */"));
        assert!(text.contains("/* login */"));
        assert!(dir
            .path()
            .join("app/build/outputs/incremental/classes.dex")
            .exists());

        // Nothing changed: every module reports without a fragment.
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);
    }

    #[test]
    fn missing_packager_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), "");
        assert!(run(&ModuleArgs { module: None }, &global_for(dir.path())).is_err());
    }

    #[test]
    fn failed_module_prevents_merge() {
        let dir = tempfile::tempdir().unwrap();
        let packager = install_packager(dir.path());
        write_project(dir.path(), &packager);
        std::fs::write(dir.path().join("login/src/Main.java"), "").unwrap();
        fail_on_empty_sources(dir.path());

        assert_eq!(run(&ModuleArgs { module: None }, &global_for(dir.path())).unwrap(), 1);
        assert!(!merged(dir.path()).exists());
    }

    #[test]
    fn failed_merge_is_redone_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let packager = install_flaky_packager(dir.path());
        write_project(dir.path(), &packager);
        let global = global_for(dir.path());

        std::fs::write(dir.path().join("fail-merge"), "").unwrap();
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 1);
        assert!(!merged(dir.path()).exists());

        std::fs::remove_file(dir.path().join("fail-merge")).unwrap();
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);
        let text = std::fs::read_to_string(merged(dir.path())).unwrap();
        assert!(text.contains("/* app */"));
        assert!(text.contains("/* login */"));
    }

    #[test]
    fn changes_survive_a_failed_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let packager = install_packager(dir.path());
        write_project(dir.path(), &packager);
        fail_on_empty_sources(dir.path());
        let global = global_for(dir.path());
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);

        std::fs::write(dir.path().join("app/src/Main.java"), "class Main { /* app v2 */ }").unwrap();
        std::fs::write(dir.path().join("login/src/Main.java"), "").unwrap();
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 1);

        let store = HistoryStore::open(&dir.path().join(".stitch/history"), TOOL_VERSION);
        assert_eq!(
            store.get(":app:compileJava").unwrap().unwrap().outcome,
            Outcome::Failed
        );

        std::fs::write(
            dir.path().join("login/src/Main.java"),
            "class Main { /* login v2 */ }",
        )
        .unwrap();
        assert_eq!(run(&ModuleArgs { module: None }, &global).unwrap(), 0);
        let text = std::fs::read_to_string(merged(dir.path())).unwrap();
        assert!(text.contains("/* app v2 */"));
        assert!(text.contains("/* login v2 */"));
    }
}
