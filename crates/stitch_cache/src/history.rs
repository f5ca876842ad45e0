//! Durable per-task baselines.
//!
//! Each `(module, task)` key owns exactly one [`BuildRecord`], stored as a
//! binary file in the history directory. A record has a header containing
//! magic bytes, format version, the producing tool version and a checksum,
//! followed by the bincode-encoded record. Records are replaced wholesale by
//! writing a temporary file next to the target and renaming it into place,
//! so a failed write never leaves a partially updated baseline behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stitch_common::ContentHash;

use crate::error::StorageError;
use crate::fingerprint::PropertySnapshot;

/// Magic bytes identifying a Stitch history record.
const RECORD_MAGIC: [u8; 4] = *b"STCH";

/// Current record format version. Increment on breaking changes to
/// the header or payload format.
const RECORD_FORMAT_VERSION: u32 = 1;

/// File extension for history records.
const RECORD_EXT: &str = "rec";

/// Header prepended to every stored record for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    magic: [u8; 4],
    format_version: u32,
    tool_version: String,
    checksum: ContentHash,
}

/// Result of the task run that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The run succeeded; the snapshots are a valid baseline.
    Success,
    /// The baseline must not be trusted; the next run rebuilds fully.
    Failed,
}

/// The persisted baseline for one `(module, task)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Owning task key, e.g. `:app:compileJava`.
    pub task_key: String,
    /// Input snapshots by property name.
    pub snapshots: BTreeMap<String, PropertySnapshot>,
    /// Outcome of the run that produced the snapshots.
    pub outcome: Outcome,
}

impl BuildRecord {
    /// Creates a successful record from the snapshots of a finished run.
    pub fn success(
        task_key: impl Into<String>,
        snapshots: BTreeMap<String, PropertySnapshot>,
    ) -> Self {
        Self {
            task_key: task_key.into(),
            snapshots,
            outcome: Outcome::Success,
        }
    }
}

/// Keyed store of the last successful baseline per task.
///
/// Writes for distinct keys touch distinct files and need no coordination.
/// Each write to one key is an atomic whole-record replacement.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
    tool_version: String,
}

impl HistoryStore {
    /// Opens a store rooted at `dir`. The directory is created on first write.
    ///
    /// Records produced by a different `tool_version` are treated as absent.
    pub fn open(dir: &Path, tool_version: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            tool_version: tool_version.to_string(),
        }
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path holding the record for `task_key`.
    pub fn record_path(&self, task_key: &str) -> PathBuf {
        let name = ContentHash::from_bytes(task_key.as_bytes());
        self.dir.join(format!("{name}.{RECORD_EXT}"))
    }

    /// Loads the baseline for `task_key`.
    ///
    /// Returns `Ok(None)` if there is no record, or if the record was written
    /// by another tool version or for another key. Unreadable or corrupt
    /// records are errors.
    pub fn get(&self, task_key: &str) -> Result<Option<BuildRecord>, StorageError> {
        let path = self.record_path(task_key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        let (header, payload) = split_record(&path, &raw)?;

        if header.tool_version != self.tool_version {
            tracing::debug!(
                task = task_key,
                found = %header.tool_version,
                "ignoring baseline written by another tool version"
            );
            return Ok(None);
        }

        let record: BuildRecord =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| StorageError::Serialization {
                    reason: e.to_string(),
                })?
                .0;

        if record.task_key != task_key {
            tracing::debug!(
                task = task_key,
                found = %record.task_key,
                "record file belongs to another task"
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Atomically replaces the baseline for `task_key`.
    ///
    /// On failure the previous record is left intact.
    pub fn put(&self, task_key: &str, record: &BuildRecord) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

        let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| StorageError::Serialization {
                reason: e.to_string(),
            })?;
        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            tool_version: self.tool_version.clone(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| StorageError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        let path = self.record_path(task_key);
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        tmp.write_all(&output)
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StorageError::io(&path, e.error))?;

        tracing::debug!(task = task_key, path = %path.display(), "baseline saved");
        Ok(())
    }

    /// Marks the baseline for `task_key` as failed, forcing a full rebuild.
    ///
    /// Returns `false` if there was no record to invalidate.
    pub fn invalidate(&self, task_key: &str) -> Result<bool, StorageError> {
        match self.get(task_key)? {
            Some(mut record) => {
                record.outcome = Outcome::Failed;
                self.put(task_key, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes the record for `task_key`. Returns `false` if none existed.
    pub fn remove(&self, task_key: &str) -> Result<bool, StorageError> {
        let path = self.record_path(task_key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Deletes every record in the store. Returns the number removed.
    pub fn clear(&self) -> Result<usize, StorageError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
                std::fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Validates the header of a raw record and returns it with the payload.
fn split_record<'a>(path: &Path, raw: &'a [u8]) -> Result<(RecordHeader, &'a [u8]), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if raw.len() < 4 {
        return Err(invalid("truncated header length"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&raw[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if raw.len() < 4 + header_len {
        return Err(invalid("truncated header"));
    }

    let header: RecordHeader =
        bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?
            .0;

    if header.magic != RECORD_MAGIC {
        return Err(invalid("missing magic bytes"));
    }
    if header.format_version != RECORD_FORMAT_VERSION {
        return Err(StorageError::VersionMismatch {
            path: path.to_path_buf(),
            expected: RECORD_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(StorageError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FileFingerprint, Normalization};

    const KEY: &str = ":app:compileJava";

    fn make_store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(&dir.path().join("history"), "0.1.0");
        (dir, store)
    }

    fn sample_record(content: &[u8]) -> BuildRecord {
        let snapshot = PropertySnapshot::new(
            "sources",
            vec![FileFingerprint::file("a/A.java", ContentHash::from_bytes(content))],
            true,
            Normalization::RelativePath,
        );
        let mut snapshots = BTreeMap::new();
        snapshots.insert("sources".to_string(), snapshot);
        BuildRecord::success(KEY, snapshots)
    }

    fn write_raw(store: &HistoryStore, header: &RecordHeader, payload: &[u8]) {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.record_path(KEY), output).unwrap();
    }

    #[test]
    fn put_and_get_roundtrip() {
        let (_dir, store) = make_store();
        let record = sample_record(b"class A {}");
        store.put(KEY, &record).unwrap();
        assert_eq!(store.get(KEY).unwrap(), Some(record));
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = make_store();
        assert!(store.get(KEY).unwrap().is_none());
    }

    #[test]
    fn survives_reopening() {
        let (dir, store) = make_store();
        store.put(KEY, &sample_record(b"v1")).unwrap();
        drop(store);

        let reopened = HistoryStore::open(&dir.path().join("history"), "0.1.0");
        assert!(reopened.get(KEY).unwrap().is_some());
    }

    #[test]
    fn put_replaces_whole_record() {
        let (_dir, store) = make_store();
        store.put(KEY, &sample_record(b"v1")).unwrap();
        let newer = sample_record(b"v2");
        store.put(KEY, &newer).unwrap();
        assert_eq!(store.get(KEY).unwrap(), Some(newer));

        // No temporary files left behind.
        let files: Vec<_> = std::fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let (_dir, store) = make_store();
        store.put(KEY, &sample_record(b"java")).unwrap();
        let other = BuildRecord {
            task_key: ":app:compileKotlin".to_string(),
            ..sample_record(b"kotlin")
        };
        store.put(":app:compileKotlin", &other).unwrap();
        assert_eq!(store.get(":app:compileKotlin").unwrap(), Some(other));
        assert_eq!(store.get(KEY).unwrap(), Some(sample_record(b"java")));
    }

    #[test]
    fn other_tool_version_is_absent() {
        let (dir, store) = make_store();
        store.put(KEY, &sample_record(b"v1")).unwrap();
        let newer_tool = HistoryStore::open(&dir.path().join("history"), "0.2.0");
        assert!(newer_tool.get(KEY).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_keeps_previous_record() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = make_store();
        let original = sample_record(b"v1");
        store.put(KEY, &original).unwrap();

        let mut perms = std::fs::metadata(store.dir()).unwrap().permissions();
        perms.set_mode(0o555);
        std::fs::set_permissions(store.dir(), perms.clone()).unwrap();

        // Skipped when running as a user that ignores directory permissions.
        let probe = store.dir().join("probe");
        let writable = std::fs::write(&probe, b"x").is_ok();
        let result = store.put(KEY, &sample_record(b"v2"));

        perms.set_mode(0o755);
        std::fs::set_permissions(store.dir(), perms).unwrap();
        if writable {
            let _ = std::fs::remove_file(probe);
            return;
        }

        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(store.get(KEY).unwrap(), Some(original));
    }

    #[test]
    fn corrupt_record_is_error() {
        let (_dir, store) = make_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.record_path(KEY), b"garbage data").unwrap();
        assert!(store.get(KEY).is_err());
    }

    #[test]
    fn truncated_record_is_error() {
        let (_dir, store) = make_store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.record_path(KEY), b"AB").unwrap();
        assert!(matches!(
            store.get(KEY),
            Err(StorageError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_error() {
        let (_dir, store) = make_store();
        let payload = b"data";
        let header = RecordHeader {
            magic: *b"BAAD",
            format_version: RECORD_FORMAT_VERSION,
            tool_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(payload),
        };
        write_raw(&store, &header, payload);
        assert!(matches!(
            store.get(KEY),
            Err(StorageError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn wrong_format_version_is_error() {
        let (_dir, store) = make_store();
        let payload = b"data";
        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: 999,
            tool_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(payload),
        };
        write_raw(&store, &header, payload);
        assert!(matches!(
            store.get(KEY),
            Err(StorageError::VersionMismatch { actual: 999, .. })
        ));
    }

    #[test]
    fn checksum_mismatch_is_error() {
        let (_dir, store) = make_store();
        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            tool_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&store, &header, b"tampered");
        assert!(matches!(
            store.get(KEY),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn invalidate_marks_failed() {
        let (_dir, store) = make_store();
        store.put(KEY, &sample_record(b"v1")).unwrap();
        assert!(store.invalidate(KEY).unwrap());
        let record = store.get(KEY).unwrap().unwrap();
        assert_eq!(record.outcome, Outcome::Failed);
        assert!(!store.invalidate(":missing:task").unwrap());
    }

    #[test]
    fn remove_and_clear() {
        let (_dir, store) = make_store();
        store.put(KEY, &sample_record(b"v1")).unwrap();
        let other = BuildRecord {
            task_key: ":lib:compileJava".to_string(),
            ..sample_record(b"v1")
        };
        store.put(":lib:compileJava", &other).unwrap();

        assert!(store.remove(KEY).unwrap());
        assert!(!store.remove(KEY).unwrap());
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.get(":lib:compileJava").unwrap().is_none());
    }

    #[test]
    fn clear_nonexistent_dir_returns_zero() {
        let (_dir, store) = make_store();
        assert_eq!(store.clear().unwrap(), 0);
    }
}
