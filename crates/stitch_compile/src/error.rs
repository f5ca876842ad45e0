//! Error types for compile orchestration.

use std::path::PathBuf;

use stitch_cache::StorageError;

/// Errors that can occur while compiling a task.
///
/// A compile error never touches the stored baseline, so the next run
/// detects the same changes again.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The compiler process could not be started.
    #[error("failed to run compiler '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The compiler ran and reported failure.
    #[error("compiler '{program}' failed ({status}): {stderr}")]
    Tool {
        /// The program that failed.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Preparing or cleaning the output directory failed.
    #[error("compile I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Fingerprinting inputs or persisting the baseline failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
