//! Shared pipeline helpers for CLI commands.
//!
//! Project root resolution, configuration loading, the history store
//! location, and running every compile task of one module.

use std::path::{Path, PathBuf};

use stitch_cache::HistoryStore;
use stitch_compile::{
    CompileError, CompileOrchestrator, CompileOutcome, CompileTask, ProcessCompiler,
};
use stitch_config::{ProjectConfig, ResolvedModule, CONFIG_FILE};

use crate::GlobalArgs;

/// Version stamped into every stored baseline.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A loaded project with its modules resolved.
pub struct Project {
    /// Directory containing `stitch.toml`.
    pub root: PathBuf,
    /// Parsed configuration.
    pub config: ProjectConfig,
    /// Selected modules, in name order.
    pub modules: Vec<ResolvedModule>,
    /// Baseline store for this project.
    pub store: HistoryStore,
}

/// Walks up from `start` looking for the nearest directory containing `stitch.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                Ok(p.parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from(".")))
            } else {
                Ok(p)
            }
        }
        None => find_project_root(&std::env::current_dir()?),
    }
}

/// Loads the project and resolves the selected modules.
pub fn load_project(
    global: &GlobalArgs,
    module: Option<&str>,
) -> Result<Project, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let config = stitch_config::load_config(&root)?;
    let modules = stitch_config::resolve_modules(&config, &root, module)?;
    let store = HistoryStore::open(&root.join(&config.cache.dir), TOOL_VERSION);
    Ok(Project {
        root,
        config,
        modules,
        store,
    })
}

/// Outcome of one task of a module.
pub struct TaskResult {
    /// History key of the task.
    pub task_key: String,
    /// What the task did.
    pub outcome: CompileOutcome,
}

/// Runs every compile task of `module` in order, stopping at the first failure.
pub fn compile_module(
    orchestrator: &CompileOrchestrator,
    module: &ResolvedModule,
) -> Result<Vec<TaskResult>, CompileError> {
    module
        .tasks
        .iter()
        .map(|resolved| {
            let task = CompileTask::from_resolved(resolved);
            let compiler = ProcessCompiler::from_config(&resolved.compiler);
            let outcome = orchestrator.run(&task, &compiler)?;
            Ok(TaskResult {
                task_key: resolved.task_key.clone(),
                outcome,
            })
        })
        .collect()
}

/// Prints one task's result as a right-aligned status line.
pub fn print_task_result(result: &TaskResult, verbose: bool) {
    let outcome = &result.outcome;
    match outcome.mode {
        None => eprintln!("     Fresh {}", result.task_key),
        Some(mode) => {
            eprintln!(
                "  Compiled {} ({mode:?}, {} file(s))",
                result.task_key,
                outcome.compiled.len()
            );
            if verbose {
                for file in &outcome.compiled {
                    eprintln!("            {}", file.key);
                }
            }
            for key in &outcome.unresolved {
                eprintln!("warning: no output found for {key}");
            }
        }
    }
}
