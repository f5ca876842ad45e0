//! The compiler capability consumed by the orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::CompileError;
use crate::naming::NamingRule;

/// How the compiler should treat existing outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Compile every source from scratch.
    Full,
    /// Update existing outputs for the listed changes only.
    Incremental,
}

/// A source file named by its fingerprint key and its location on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChangedFile {
    /// Normalized key (relative to its source root).
    pub key: String,
    /// Filesystem location.
    pub path: PathBuf,
}

/// One invocation of a compiler.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Full or incremental.
    pub mode: CompileMode,
    /// Files to compile: every source in full mode, added + modified otherwise.
    pub sources: Vec<ChangedFile>,
    /// Sources added since the baseline.
    pub added: Vec<ChangedFile>,
    /// Sources modified since the baseline.
    pub modified: Vec<ChangedFile>,
    /// Sources removed since the baseline. Their stale outputs are the
    /// compiler's to delete.
    pub removed: Vec<ChangedFile>,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Classpath entries.
    pub classpath: Vec<PathBuf>,
}

/// What a successful compile reports back.
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    /// Explicit source → outputs mapping, when the compiler knows it.
    pub mapping: Option<BTreeMap<PathBuf, Vec<PathBuf>>>,
}

/// An external compiler for one language.
pub trait Compiler: Send + Sync {
    /// Compiles the request, updating outputs in place.
    fn compile(&self, request: &CompileRequest) -> Result<CompileReport, CompileError>;

    /// The rule mapping a source key to its output.
    fn naming(&self) -> &NamingRule;
}
