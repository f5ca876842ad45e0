//! Change detection and the Full / Incremental / Skip decision policy.
//!
//! Current input snapshots are compared property by property against the
//! task's stored baseline. Equal aggregates short-circuit to "unchanged";
//! otherwise incremental-capable properties are diffed per key while any
//! change to a non-incremental property forces a full rebuild of the task.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::StorageError;
use crate::fingerprint::{compute_fingerprint, InputProperty, PropertySnapshot};
use crate::history::{BuildRecord, HistoryStore, Outcome};

/// Differences of one property between the baseline and the current inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Property name.
    pub property_name: String,
    /// Keys present only in the current snapshot.
    pub added: BTreeSet<String>,
    /// Keys present in both snapshots with differing hashes.
    pub modified: BTreeSet<String>,
    /// Keys present only in the baseline.
    pub removed: BTreeSet<String>,
    /// The property changed and cannot be diffed per file.
    pub whole_changed: bool,
}

impl ChangeSet {
    /// Creates an empty change set for a property.
    pub fn unchanged(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if nothing was added, modified or removed.
    pub fn is_empty(&self) -> bool {
        !self.whole_changed
            && self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
    }

    /// Returns the number of keys that need recompiling (added + modified).
    pub fn dirty_count(&self) -> usize {
        self.added.len() + self.modified.len()
    }

    /// Returns a copy keeping only the keys accepted by `keep`.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> ChangeSet {
        let filter = |keys: &BTreeSet<String>| {
            keys.iter()
                .filter(|k| keep(k.as_str()))
                .cloned()
                .collect::<BTreeSet<_>>()
        };
        ChangeSet {
            property_name: self.property_name.clone(),
            added: filter(&self.added),
            modified: filter(&self.modified),
            removed: filter(&self.removed),
            whole_changed: self.whole_changed,
        }
    }
}

/// Why a task has to be rebuilt from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FullReason {
    /// No baseline has been recorded for the task.
    NoBaseline,
    /// The baseline is marked as failed.
    FailedBaseline,
    /// The baseline could not be read.
    UnreadableBaseline,
    /// A declared output is missing or empty.
    OutputsMissing,
    /// A non-incremental property changed.
    WholeChanged(String),
    /// The set of declared properties differs from the baseline.
    PropertySetChanged,
}

impl fmt::Display for FullReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullReason::NoBaseline => write!(f, "no previous baseline"),
            FullReason::FailedBaseline => write!(f, "previous baseline is marked failed"),
            FullReason::UnreadableBaseline => write!(f, "previous baseline is unreadable"),
            FullReason::OutputsMissing => write!(f, "outputs are missing or empty"),
            FullReason::WholeChanged(name) => write!(f, "non-incremental input '{name}' changed"),
            FullReason::PropertySetChanged => write!(f, "declared inputs changed"),
        }
    }
}

/// What a task should do this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Rebuild everything.
    Full(FullReason),
    /// Rebuild only the listed relevant changes.
    Incremental(Vec<ChangeSet>),
    /// Nothing relevant changed; the compiler is not invoked.
    Skip,
}

/// Everything the detector needs to know about one task.
#[derive(Debug, Clone)]
pub struct TaskInputs {
    /// History key of the task.
    pub task_key: String,
    /// Declared input properties.
    pub properties: Vec<InputProperty>,
    /// Declared output locations.
    pub outputs: Vec<PathBuf>,
    /// Extensions (without the dot) of source files that drive recompilation.
    /// Empty means every file is relevant.
    pub source_extensions: Vec<String>,
}

impl TaskInputs {
    /// Returns `true` if a key names a source file this task compiles.
    pub fn is_relevant(&self, key: &str) -> bool {
        self.source_extensions.is_empty()
            || self.source_extensions.iter().any(|ext| {
                key.rsplit_once('.')
                    .is_some_and(|(_, found)| found == ext)
            })
    }

    /// Looks up a declared property by name.
    pub fn property(&self, name: &str) -> Option<&InputProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Fingerprints every declared property.
    pub fn snapshot(&self) -> Result<BTreeMap<String, PropertySnapshot>, StorageError> {
        self.properties
            .iter()
            .map(|p| Ok((p.name.clone(), compute_fingerprint(p)?)))
            .collect()
    }
}

/// The outcome of change detection for one task.
#[derive(Debug, Clone)]
pub struct Detection {
    /// History key of the task.
    pub task_key: String,
    /// The chosen action.
    pub decision: Decision,
    /// Current snapshots, persisted as the new baseline after an incremental run.
    pub current: BTreeMap<String, PropertySnapshot>,
}

/// Diffs one property against its baseline.
pub fn diff_property(prior: &PropertySnapshot, current: &PropertySnapshot) -> ChangeSet {
    let mut changes = ChangeSet::unchanged(&current.property_name);
    if prior.aggregate == current.aggregate {
        return changes;
    }
    if !current.incremental_capable {
        changes.whole_changed = true;
        return changes;
    }

    for fp in &current.fingerprints {
        match prior.get(&fp.key) {
            None => {
                changes.added.insert(fp.key.clone());
            }
            Some(old) if old.content_hash != fp.content_hash => {
                changes.modified.insert(fp.key.clone());
            }
            Some(_) => {}
        }
    }
    for fp in &prior.fingerprints {
        if current.get(&fp.key).is_none() {
            changes.removed.insert(fp.key.clone());
        }
    }
    changes
}

/// Returns `true` if every declared output exists and is not an empty directory.
pub fn outputs_present(outputs: &[PathBuf]) -> bool {
    outputs.iter().all(|out| {
        if out.is_dir() {
            std::fs::read_dir(out)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
        } else {
            out.exists()
        }
    })
}

/// Chooses the action for a task.
///
/// Full if there is no usable baseline, outputs are missing, the property
/// set changed, or any non-incremental property changed. Otherwise
/// Incremental when a relevant source was added, modified or removed, and
/// Skip when nothing relevant changed.
pub fn decide(
    prior: Option<&BuildRecord>,
    current: &BTreeMap<String, PropertySnapshot>,
    outputs_present: bool,
    is_relevant: impl Fn(&str) -> bool,
) -> Decision {
    let Some(prior) = prior else {
        return Decision::Full(FullReason::NoBaseline);
    };
    if prior.outcome == Outcome::Failed {
        return Decision::Full(FullReason::FailedBaseline);
    }
    if !outputs_present {
        return Decision::Full(FullReason::OutputsMissing);
    }
    if !prior.snapshots.keys().eq(current.keys()) {
        return Decision::Full(FullReason::PropertySetChanged);
    }

    let mut relevant = Vec::new();
    for (name, snapshot) in current {
        let changes = diff_property(&prior.snapshots[name], snapshot);
        if changes.whole_changed {
            return Decision::Full(FullReason::WholeChanged(name.clone()));
        }
        let changes = changes.retain(&is_relevant);
        if !changes.is_empty() {
            relevant.push(changes);
        }
    }

    if relevant.is_empty() {
        Decision::Skip
    } else {
        Decision::Incremental(relevant)
    }
}

/// Loads the baseline for a task, fingerprints its inputs and decides.
///
/// An unreadable baseline is logged and treated as absent.
pub fn detect(store: &HistoryStore, inputs: &TaskInputs) -> Result<Detection, StorageError> {
    let current = inputs.snapshot()?;

    let decision = match store.get(&inputs.task_key) {
        Ok(prior) => decide(
            prior.as_ref(),
            &current,
            outputs_present(&inputs.outputs),
            |key| inputs.is_relevant(key),
        ),
        Err(e) => {
            tracing::warn!(task = %inputs.task_key, error = %e, "baseline unreadable, rebuilding fully");
            Decision::Full(FullReason::UnreadableBaseline)
        }
    };

    log_decision(&inputs.task_key, &decision);
    Ok(Detection {
        task_key: inputs.task_key.clone(),
        decision,
        current,
    })
}

fn log_decision(task_key: &str, decision: &Decision) {
    match decision {
        Decision::Full(reason) => {
            tracing::info!("{task_key} full compile: {reason}");
        }
        Decision::Skip => {
            tracing::info!("{task_key} no source has changes, skipped compile");
        }
        Decision::Incremental(changes) => {
            tracing::info!("{task_key} file changes:");
            for set in changes {
                for key in &set.added {
                    tracing::info!("  added    {}: {key}", set.property_name);
                }
                for key in &set.modified {
                    tracing::info!("  modified {}: {key}", set.property_name);
                }
                for key in &set.removed {
                    tracing::info!("  removed  {}: {key}", set.property_name);
                }
            }
        }
    }
}
