//! Collects per-module fragments and merges them once every module reported.
//!
//! Modules run concurrently and each reports exactly once per cycle, with or
//! without a fragment. The report that completes the cycle performs the
//! merge. Bookkeeping happens under one mutex; the merge tool runs outside it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::MergeError;
use crate::packager::Packager;

/// Result of a report or a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// More modules still have to report.
    Pending {
        /// Reports received so far this cycle.
        reported: usize,
        /// Reports required to complete the cycle.
        expected: usize,
    },
    /// The cycle completed and the fragments were merged.
    Merged(PathBuf),
    /// The cycle completed without any fragment; the tool was not run.
    NothingToMerge,
    /// The report arrived while a merge was running or awaiting retry and
    /// was not counted.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Merging,
}

#[derive(Debug)]
struct State {
    reported: usize,
    artifacts: BTreeSet<PathBuf>,
    phase: Phase,
}

impl State {
    fn reset(&mut self) {
        self.reported = 0;
        self.artifacts.clear();
        self.phase = Phase::Open;
    }
}

/// One build cycle's meeting point for module fragments.
pub struct Rendezvous {
    expected: usize,
    packager: Box<dyn Packager>,
    merged_dir: PathBuf,
    state: Mutex<State>,
}

impl Rendezvous {
    /// Creates a rendezvous waiting for `expected` reports per cycle.
    pub fn new(expected: usize, packager: Box<dyn Packager>, merged_dir: impl Into<PathBuf>) -> Self {
        Self {
            expected,
            packager,
            merged_dir: merged_dir.into(),
            state: Mutex::new(State {
                reported: 0,
                artifacts: BTreeSet::new(),
                phase: Phase::Open,
            }),
        }
    }

    /// Reports required per cycle.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Reports received so far in the current cycle.
    pub fn reported(&self) -> usize {
        self.lock().reported
    }

    /// Distinct fragments held for the current cycle.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.lock().artifacts.iter().cloned().collect()
    }

    /// Directory receiving the merged artifact.
    pub fn merged_dir(&self) -> &Path {
        &self.merged_dir
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one module's report and merges if it completes the cycle.
    ///
    /// A module that produced nothing still reports with `None`.
    pub fn report(
        &self,
        module: &str,
        artifact: Option<PathBuf>,
    ) -> Result<ReportOutcome, MergeError> {
        let fragments = {
            let mut state = self.lock();
            if state.phase == Phase::Merging || state.reported >= self.expected {
                tracing::warn!("{module} report rejected, the current cycle is already complete");
                return Ok(ReportOutcome::Rejected);
            }
            state.reported += 1;
            if let Some(artifact) = artifact {
                state.artifacts.insert(artifact);
            }
            tracing::debug!(
                module,
                reported = state.reported,
                expected = self.expected,
                "fragment reported"
            );
            if state.reported < self.expected {
                return Ok(ReportOutcome::Pending {
                    reported: state.reported,
                    expected: self.expected,
                });
            }
            state.phase = Phase::Merging;
            state.artifacts.iter().cloned().collect::<Vec<_>>()
        };
        self.merge(fragments)
    }

    /// Merges the current cycle if it is complete and no merge is running.
    ///
    /// This is the retry path after a failed merge.
    pub fn merge_if_complete(&self) -> Result<Option<ReportOutcome>, MergeError> {
        let fragments = {
            let mut state = self.lock();
            if state.phase == Phase::Merging || state.reported < self.expected {
                return Ok(None);
            }
            state.phase = Phase::Merging;
            state.artifacts.iter().cloned().collect::<Vec<_>>()
        };
        self.merge(fragments).map(Some)
    }

    fn merge(&self, fragments: Vec<PathBuf>) -> Result<ReportOutcome, MergeError> {
        if fragments.is_empty() {
            tracing::info!("no fragments this cycle, nothing to merge");
            self.lock().reset();
            return Ok(ReportOutcome::NothingToMerge);
        }

        match self.packager.merge(&fragments, &self.merged_dir) {
            Ok(merged) => {
                self.lock().reset();
                tracing::info!("merged artifact: {}", merged.display());
                Ok(ReportOutcome::Merged(merged))
            }
            Err(source) => {
                let mut state = self.lock();
                state.phase = Phase::Open;
                tracing::warn!(
                    retained = state.artifacts.len(),
                    "merge failed, fragments kept for retry"
                );
                Err(MergeError {
                    retained: state.artifacts.len(),
                    source,
                })
            }
        }
    }
}
