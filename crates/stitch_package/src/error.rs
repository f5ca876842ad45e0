//! Error types for packaging and merging.

use std::path::PathBuf;

/// Errors raised by the external packaging tool.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// The tool could not be started.
    #[error("failed to run packager '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The tool ran and reported failure.
    #[error("packager '{program}' failed ({status}): {stderr}")]
    Tool {
        /// The program that failed.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The tool exited successfully without producing its output file.
    #[error("packager '{program}' produced no output at {path}")]
    MissingOutput {
        /// The program that ran.
        program: String,
        /// The file that was expected.
        path: PathBuf,
    },

    /// Preparing the destination directory failed.
    #[error("packaging I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// A failed merge. The rendezvous keeps every reported artifact so the
/// merge can be retried without recompiling.
#[derive(Debug, thiserror::Error)]
#[error("merge of {retained} artifact(s) failed: {source}")]
pub struct MergeError {
    /// Number of distinct artifacts still held for retry.
    pub retained: usize,
    /// The packaging failure.
    #[source]
    pub source: PackageError,
}
