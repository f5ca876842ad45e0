//! File and property fingerprints.
//!
//! A property (one logical input group such as "sources" or "classpath") is
//! fingerprinted by hashing every file it covers and keying each file under a
//! [`Normalization`] policy. The resulting [`PropertySnapshot`] is sorted by
//! key and carries an aggregate hash, so two snapshots can be compared in
//! O(1) before falling back to a per-file diff.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stitch_common::{ContentHash, ContentHasher};
use walkdir::WalkDir;

use crate::error::StorageError;

/// Rule mapping a file's location to the key used in fingerprint comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    /// Keep the full path. Any relocation shows up as a change.
    AbsolutePath,
    /// Strip the owning root, so the whole project may move freely.
    RelativePath,
    /// Keep only the file name, for inputs where only content matters.
    NameOnly,
}

impl Normalization {
    /// Computes the key of `path` under this policy.
    ///
    /// For [`RelativePath`](Self::RelativePath) the longest root containing
    /// `path` is stripped; a path under no root keeps its absolute key.
    pub fn key_for(self, path: &Path, roots: &[PathBuf]) -> String {
        match self {
            Normalization::AbsolutePath => path_key(path),
            Normalization::RelativePath => roots
                .iter()
                .filter_map(|root| {
                    path.strip_prefix(root)
                        .ok()
                        .map(|rel| (root.as_os_str().len(), rel))
                })
                .max_by_key(|(len, _)| *len)
                .map(|(_, rel)| path_key(rel))
                .unwrap_or_else(|| path_key(path)),
            Normalization::NameOnly => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_key(path)),
        }
    }

    /// Maps a key back to a filesystem location.
    ///
    /// Relative keys resolve against the first root under which the file
    /// exists, falling back to the first root (the usual case for removed
    /// files). Absolute keys, and keys with no roots to resolve against, are
    /// returned as paths unchanged.
    pub fn locate(self, key: &str, roots: &[PathBuf]) -> PathBuf {
        let as_path = PathBuf::from(key);
        if self == Normalization::AbsolutePath || as_path.is_absolute() {
            return as_path;
        }
        roots
            .iter()
            .map(|root| root.join(key))
            .find(|candidate| candidate.exists())
            .or_else(|| roots.first().map(|root| root.join(key)))
            .unwrap_or(as_path)
    }
}

/// Renders a path as a `/`-separated key regardless of platform convention.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Content identity of a single file under one normalization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Normalized file identity. Unique within one snapshot.
    pub key: String,
    /// XXH3-128 digest of the file bytes (directories hash the empty input).
    pub content_hash: ContentHash,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl FileFingerprint {
    /// Creates a fingerprint for a regular file.
    pub fn file(key: impl Into<String>, content_hash: ContentHash) -> Self {
        Self {
            key: key.into(),
            content_hash,
            is_directory: false,
        }
    }
}

/// Fingerprints of one input property at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    /// Property name (e.g., "sources").
    pub property_name: String,
    /// File fingerprints, sorted by key.
    pub fingerprints: Vec<FileFingerprint>,
    /// Whether per-file diffing is safe for this property.
    pub incremental_capable: bool,
    /// The policy the keys were computed under.
    pub normalization: Normalization,
    /// Stable hash over the sorted `(key, hash, is_directory)` entries.
    pub aggregate: ContentHash,
}

impl PropertySnapshot {
    /// Builds a snapshot, sorting the fingerprints and computing the aggregate.
    pub fn new(
        property_name: impl Into<String>,
        mut fingerprints: Vec<FileFingerprint>,
        incremental_capable: bool,
        normalization: Normalization,
    ) -> Self {
        fingerprints.sort_by(|a, b| a.key.cmp(&b.key));
        let mut hasher = ContentHasher::new();
        for fp in &fingerprints {
            hasher.update_str(&fp.key);
            hasher.update_hash(&fp.content_hash);
            hasher.update_bool(fp.is_directory);
        }
        Self {
            property_name: property_name.into(),
            fingerprints,
            incremental_capable,
            normalization,
            aggregate: hasher.finish(),
        }
    }

    /// Looks up a fingerprint by key.
    pub fn get(&self, key: &str) -> Option<&FileFingerprint> {
        self.fingerprints
            .binary_search_by(|fp| fp.key.as_str().cmp(key))
            .ok()
            .map(|idx| &self.fingerprints[idx])
    }

    /// Returns the number of fingerprinted entries.
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// Returns `true` if the property covers no files.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// One declared input group of a task.
#[derive(Debug, Clone)]
pub struct InputProperty {
    /// Property name, unique within the task.
    pub name: String,
    /// Declared files or directories. Directories are walked recursively.
    pub paths: Vec<PathBuf>,
    /// Roots stripped by [`Normalization::RelativePath`].
    pub roots: Vec<PathBuf>,
    /// Key policy.
    pub normalization: Normalization,
    /// Whether per-file diffing may drive partial recompilation.
    pub incremental: bool,
}

/// Fingerprints every file covered by `property`.
///
/// Declared paths that do not exist are skipped, so they surface as removals
/// when compared against a baseline. Files are hashed in parallel; the result
/// does not depend on enumeration order.
pub fn compute_fingerprint(property: &InputProperty) -> Result<PropertySnapshot, StorageError> {
    let entries = collect_entries(&property.paths)?;

    let hashed: Vec<Option<(String, ContentHash, bool)>> = entries
        .par_iter()
        .map(|(path, is_directory)| {
            let hash = if *is_directory {
                ContentHash::from_bytes(&[])
            } else {
                match std::fs::read(path) {
                    Ok(bytes) => ContentHash::from_bytes(&bytes),
                    // Deleted between the walk and the read.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(StorageError::io(path, e)),
                }
            };
            let key = property.normalization.key_for(path, &property.roots);
            Ok(Some((key, hash, *is_directory)))
        })
        .collect::<Result<_, StorageError>>()?;

    let mut hashed: Vec<(String, ContentHash, bool)> = hashed.into_iter().flatten().collect();
    hashed.sort();

    let fingerprints = disambiguate(hashed);
    tracing::debug!(
        property = %property.name,
        files = fingerprints.len(),
        "fingerprinted input property"
    );

    Ok(PropertySnapshot::new(
        property.name.clone(),
        fingerprints,
        property.incremental,
        property.normalization,
    ))
}

/// Expands declared paths into a sorted, duplicate-free list of entries.
fn collect_entries(paths: &[PathBuf]) -> Result<Vec<(PathBuf, bool)>, StorageError> {
    let mut entries = Vec::new();
    for declared in paths {
        if !declared.exists() {
            tracing::debug!(path = %declared.display(), "declared input does not exist");
            continue;
        }
        if declared.is_dir() {
            for entry in WalkDir::new(declared).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(declared).to_path_buf();
                    StorageError::io(path, e.into())
                })?;
                entries.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
            }
        } else {
            entries.push((declared.clone(), false));
        }
    }
    entries.sort();
    entries.dedup();
    Ok(entries)
}

/// Makes keys unique. Entries must be sorted by `(key, hash)`; later entries
/// sharing a key get `#1`, `#2`, ... appended, skipping names already in use.
fn disambiguate(sorted: Vec<(String, ContentHash, bool)>) -> Vec<FileFingerprint> {
    let mut taken: BTreeSet<String> = sorted.iter().map(|(key, _, _)| key.clone()).collect();
    let mut out: Vec<FileFingerprint> = Vec::with_capacity(sorted.len());
    let mut previous: Option<String> = None;
    let mut repeat = 0usize;
    for (key, content_hash, is_directory) in sorted {
        let unique = if previous.as_deref() == Some(key.as_str()) {
            // A real entry may already carry the suffixed name.
            let candidate = loop {
                repeat += 1;
                let candidate = format!("{key}#{repeat}");
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(candidate.clone());
            candidate
        } else {
            repeat = 0;
            key.clone()
        };
        previous = Some(key);
        out.push(FileFingerprint {
            key: unique,
            content_hash,
            is_directory,
        });
    }
    out
}
