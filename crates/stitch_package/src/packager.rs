//! The packaging capability and its process-backed implementation.

use std::path::{Path, PathBuf};
use std::process::Command;

use stitch_config::ResolvedPackager;

use crate::error::PackageError;

/// An external tool that packages compiled outputs and merges fragments.
pub trait Packager: Send + Sync {
    /// Packages compiled outputs into one fragment inside `dest_dir`.
    fn package(&self, inputs: &[PathBuf], dest_dir: &Path) -> Result<PathBuf, PackageError>;

    /// Merges fragments into one artifact inside `dest_dir`.
    fn merge(&self, fragments: &[PathBuf], dest_dir: &Path) -> Result<PathBuf, PackageError>;
}

/// Runs `<program> --output <dest> <args...> <inputs...>`.
///
/// The tool writes `<dest>/<output_name>`. Any previous file of that name is
/// deleted first, and the call succeeds only if the tool recreated it.
#[derive(Debug, Clone)]
pub struct ProcessPackager {
    program: String,
    args: Vec<String>,
    output_name: String,
}

impl ProcessPackager {
    /// Creates a packager from explicit parts.
    pub fn new(program: impl Into<String>, args: Vec<String>, output_name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            output_name: output_name.into(),
        }
    }

    /// Creates a packager from the resolved project configuration.
    pub fn from_resolved(config: &ResolvedPackager) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.fragment_name.clone(),
        )
    }

    fn run(&self, inputs: &[PathBuf], dest_dir: &Path) -> Result<PathBuf, PackageError> {
        let io_error = |path: &Path, source| PackageError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dest_dir).map_err(|e| io_error(dest_dir, e))?;

        let expected = dest_dir.join(&self.output_name);
        match std::fs::remove_file(&expected) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&expected, e)),
        }

        tracing::debug!(program = %self.program, inputs = inputs.len(), "invoking packager");
        let output = Command::new(&self.program)
            .arg("--output")
            .arg(dest_dir)
            .args(&self.args)
            .args(inputs)
            .output()
            .map_err(|e| PackageError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(PackageError::Tool {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !expected.exists() {
            return Err(PackageError::MissingOutput {
                program: self.program.clone(),
                path: expected,
            });
        }
        Ok(expected)
    }
}

impl Packager for ProcessPackager {
    fn package(&self, inputs: &[PathBuf], dest_dir: &Path) -> Result<PathBuf, PackageError> {
        self.run(inputs, dest_dir)
    }

    fn merge(&self, fragments: &[PathBuf], dest_dir: &Path) -> Result<PathBuf, PackageError> {
        self.run(fragments, dest_dir)
    }
}

/// The fragment one module contributes to a packaging cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArtifact {
    /// Module name.
    pub module: String,
    /// The packaged fragment, or `None` if the module compiled nothing.
    pub artifact: Option<PathBuf>,
}

/// Packages one module's compiled outputs into `dest_dir`.
pub fn package_module(
    packager: &dyn Packager,
    module: &str,
    compiled: &[PathBuf],
    dest_dir: &Path,
) -> Result<ModuleArtifact, PackageError> {
    if compiled.is_empty() {
        tracing::info!("{module} has no compiled outputs, nothing to package");
        return Ok(ModuleArtifact {
            module: module.to_string(),
            artifact: None,
        });
    }

    let fragment = packager.package(compiled, dest_dir)?;
    tracing::info!("{module} fragment: {}", fragment.display());
    Ok(ModuleArtifact {
        module: module.to_string(),
        artifact: Some(fragment),
    })
}
