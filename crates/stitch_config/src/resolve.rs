//! Module resolution: turning configured modules into concrete compile tasks.

use crate::error::ConfigError;
use crate::types::{CompilerConfig, PackagerConfig, ProjectConfig};
use std::path::{Path, PathBuf};

/// A module with every path made absolute and one task per compiler.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// The module name.
    pub name: String,
    /// Absolute module directory.
    pub dir: PathBuf,
    /// Compile tasks, in the order the module lists its compilers.
    pub tasks: Vec<ResolvedTask>,
}

/// One `(module, compiler)` compile task.
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    /// Owning module name.
    pub module: String,
    /// Task name (e.g., `compileJava`).
    pub task_name: String,
    /// History key, `:<module>:<task>`.
    pub task_key: String,
    /// Name of the compiler definition.
    pub compiler_name: String,
    /// The compiler definition.
    pub compiler: CompilerConfig,
    /// Absolute source roots.
    pub source_roots: Vec<PathBuf>,
    /// Absolute classpath entries.
    pub classpath: Vec<PathBuf>,
    /// Absolute output directory.
    pub output_dir: PathBuf,
}

/// The packaging tool with its directories resolved.
#[derive(Debug, Clone)]
pub struct ResolvedPackager {
    /// Executable name or path.
    pub program: String,
    /// Extra arguments.
    pub args: Vec<String>,
    /// File name the tool writes into its output directory.
    pub fragment_name: String,
    /// Fragment directory relative to each module directory.
    pub fragment_dir: String,
    /// Absolute directory receiving the merged artifact.
    pub merged_dir: PathBuf,
}

impl ResolvedPackager {
    /// Returns the absolute fragment directory for a module.
    pub fn fragment_dir_for(&self, module: &ResolvedModule) -> PathBuf {
        module.dir.join(&self.fragment_dir)
    }
}

/// Builds the history key for a module task.
pub fn task_key(module: &str, task: &str) -> String {
    format!(":{module}:{task}")
}

/// Default task name for a compiler: `java` → `compileJava`.
fn default_task_name(compiler: &str) -> String {
    let mut chars = compiler.chars();
    match chars.next() {
        Some(first) => format!("compile{}{}", first.to_uppercase(), chars.as_str()),
        None => "compile".to_string(),
    }
}

/// Resolves one named module against the project root.
pub fn resolve_module(
    config: &ProjectConfig,
    project_root: &Path,
    name: &str,
) -> Result<ResolvedModule, ConfigError> {
    let module = config
        .modules
        .get(name)
        .ok_or_else(|| ConfigError::UnknownModule(name.to_string()))?;

    let dir = project_root.join(module.path.as_deref().unwrap_or(name));
    let source_roots: Vec<PathBuf> = module.sources.iter().map(|s| dir.join(s)).collect();
    let classpath: Vec<PathBuf> = module.classpath.iter().map(|c| dir.join(c)).collect();

    let mut tasks = Vec::with_capacity(module.compilers.len());
    for compiler_name in &module.compilers {
        let compiler = config
            .compilers
            .get(compiler_name)
            .ok_or_else(|| ConfigError::UnknownCompiler {
                module: name.to_string(),
                compiler: compiler_name.clone(),
            })?;
        let task_name = compiler
            .task
            .clone()
            .unwrap_or_else(|| default_task_name(compiler_name));
        tasks.push(ResolvedTask {
            module: name.to_string(),
            task_key: task_key(name, &task_name),
            task_name,
            compiler_name: compiler_name.clone(),
            compiler: compiler.clone(),
            source_roots: source_roots.clone(),
            classpath: classpath.clone(),
            output_dir: dir.join(&compiler.output_dir),
        });
    }

    Ok(ResolvedModule {
        name: name.to_string(),
        dir,
        tasks,
    })
}

/// Resolves either the single selected module or every configured module.
pub fn resolve_modules(
    config: &ProjectConfig,
    project_root: &Path,
    selected: Option<&str>,
) -> Result<Vec<ResolvedModule>, ConfigError> {
    match selected {
        Some(name) => Ok(vec![resolve_module(config, project_root, name)?]),
        None => config
            .modules
            .keys()
            .map(|name| resolve_module(config, project_root, name))
            .collect(),
    }
}

/// Resolves the packaging tool, which must be configured.
pub fn resolve_packager(
    config: &ProjectConfig,
    project_root: &Path,
) -> Result<ResolvedPackager, ConfigError> {
    let PackagerConfig {
        program,
        args,
        fragment_name,
        fragment_dir,
        merged_dir,
    } = config
        .packager
        .clone()
        .ok_or_else(|| ConfigError::MissingField("packager".to_string()))?;

    Ok(ResolvedPackager {
        program,
        args,
        fragment_name,
        fragment_dir,
        merged_dir: project_root.join(merged_dir),
    })
}
