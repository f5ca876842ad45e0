//! Compile task inputs derived from a resolved module task.

use std::path::PathBuf;

use stitch_cache::{InputProperty, Normalization, PropertySnapshot, TaskInputs};
use stitch_config::ResolvedTask;

use crate::compiler::ChangedFile;

/// Name of the source file property.
pub const SOURCES_PROPERTY: &str = "sources";

/// Name of the classpath property.
pub const CLASSPATH_PROPERTY: &str = "classpath";

/// One `(module, compiler)` compile unit with its declared inputs and output.
#[derive(Debug, Clone)]
pub struct CompileTask {
    /// Owning module name.
    pub module: String,
    /// Inputs handed to change detection.
    pub inputs: TaskInputs,
    /// Directory the compiler writes into.
    pub output_dir: PathBuf,
    /// Classpath entries passed to the compiler.
    pub classpath: Vec<PathBuf>,
    /// Roots that source keys are relative to.
    pub source_roots: Vec<PathBuf>,
}

impl CompileTask {
    /// Builds the task's inputs from configuration.
    ///
    /// Sources are keyed relative to their roots and diffed per file. The
    /// classpath is keyed by file name only and any change to it forces a
    /// full rebuild.
    pub fn from_resolved(task: &ResolvedTask) -> Self {
        let sources = InputProperty {
            name: SOURCES_PROPERTY.to_string(),
            paths: task.source_roots.clone(),
            roots: task.source_roots.clone(),
            normalization: Normalization::RelativePath,
            incremental: true,
        };
        let classpath = InputProperty {
            name: CLASSPATH_PROPERTY.to_string(),
            paths: task.classpath.clone(),
            roots: Vec::new(),
            normalization: Normalization::NameOnly,
            incremental: false,
        };
        Self {
            module: task.module.clone(),
            inputs: TaskInputs {
                task_key: task.task_key.clone(),
                properties: vec![sources, classpath],
                outputs: vec![task.output_dir.clone()],
                source_extensions: task.compiler.extensions.clone(),
            },
            output_dir: task.output_dir.clone(),
            classpath: task.classpath.clone(),
            source_roots: task.source_roots.clone(),
        }
    }

    /// History key of the task.
    pub fn key(&self) -> &str {
        &self.inputs.task_key
    }

    /// Maps a source key back to its file.
    pub fn changed_file(&self, key: &str) -> ChangedFile {
        ChangedFile {
            key: key.to_string(),
            path: Normalization::RelativePath.locate(key, &self.source_roots),
        }
    }

    /// Every relevant source file recorded in a snapshot of the sources property.
    pub fn relevant_sources(&self, sources: &PropertySnapshot) -> Vec<ChangedFile> {
        sources
            .fingerprints
            .iter()
            .filter(|fp| !fp.is_directory && self.inputs.is_relevant(&fp.key))
            .map(|fp| self.changed_file(&fp.key))
            .collect()
    }
}
