//! A [`Compiler`] backed by an external process.

use std::path::Path;
use std::process::Command;

use stitch_config::CompilerConfig;

use crate::compiler::{CompileMode, CompileReport, CompileRequest, Compiler};
use crate::error::CompileError;
use crate::naming::NamingRule;

/// Placeholder replaced with the output directory.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Placeholder replaced with the joined classpath.
const CLASSPATH_PLACEHOLDER: &str = "{classpath}";

#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

/// Runs `<program> <args...> <sources...>` for each compile.
///
/// Full compiles clear the output directory first. Outputs of removed
/// sources are deleted using the naming rule before the process runs.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: String,
    args: Vec<String>,
    naming: NamingRule,
}

impl ProcessCompiler {
    /// Creates a compiler from explicit parts.
    pub fn new(program: impl Into<String>, args: Vec<String>, naming: NamingRule) -> Self {
        Self {
            program: program.into(),
            args,
            naming,
        }
    }

    /// Creates a compiler from its `stitch.toml` definition.
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            NamingRule::from(&config.naming),
        )
    }

    fn expand_args(&self, request: &CompileRequest) -> Vec<String> {
        let output = request.output_dir.to_string_lossy();
        let classpath = request
            .classpath
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(CLASSPATH_SEPARATOR);
        self.args
            .iter()
            .map(|arg| {
                arg.replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(CLASSPATH_PLACEHOLDER, &classpath)
            })
            .collect()
    }

    fn delete_stale_outputs(&self, request: &CompileRequest) -> Result<(), CompileError> {
        for removed in &request.removed {
            let candidates = std::iter::once(self.naming.primary(&removed.key, &request.output_dir))
                .chain(self.naming.alternate(&removed.key, &request.output_dir));
            for candidate in candidates {
                match std::fs::remove_file(&candidate) {
                    Ok(()) => {
                        tracing::debug!(output = %candidate.display(), "removed stale output");
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(&candidate, e)),
                }
            }
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CompileError {
    CompileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn reset_dir(dir: &Path) -> Result<(), CompileError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| io_error(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))
}

impl Compiler for ProcessCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<CompileReport, CompileError> {
        match request.mode {
            CompileMode::Full => reset_dir(&request.output_dir)?,
            CompileMode::Incremental => {
                std::fs::create_dir_all(&request.output_dir)
                    .map_err(|e| io_error(&request.output_dir, e))?;
                self.delete_stale_outputs(request)?;
            }
        }

        if request.sources.is_empty() {
            return Ok(CompileReport::default());
        }

        let args = self.expand_args(request);
        tracing::debug!(
            program = %self.program,
            files = request.sources.len(),
            "invoking compiler"
        );
        let output = Command::new(&self.program)
            .args(&args)
            .args(request.sources.iter().map(|s| &s.path))
            .output()
            .map_err(|e| CompileError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(CompileError::Tool {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(CompileReport::default())
    }

    fn naming(&self) -> &NamingRule {
        &self.naming
    }
}
