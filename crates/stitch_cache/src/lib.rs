//! Incremental build state: fingerprints, baselines and change detection.
//!
//! This crate fingerprints task inputs, persists the last successful
//! fingerprint set per task, and compares the two to decide whether a task
//! must rebuild fully, rebuild incrementally, or can be skipped.

#![warn(missing_docs)]

pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod history;

pub use detect::{
    decide, detect, diff_property, outputs_present, ChangeSet, Decision, Detection, FullReason,
    TaskInputs,
};
pub use error::StorageError;
pub use fingerprint::{
    compute_fingerprint, FileFingerprint, InputProperty, Normalization, PropertySnapshot,
};
pub use history::{BuildRecord, HistoryStore, Outcome};
