//! The per-directory backup ledger and metadata sidecars.
//!
//! Every backup directory may hold a `.backup_index.json` listing all
//! [`BackupRecord`]s for every target backed up into it, in chronological
//! (insertion) order.  All mutation happens in memory; [`BackupIndex::persist`]
//! is the only path that writes the file, and it does so atomically.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use super::naming::{BackupFormat, SIDECAR_EXT, sidecar_path};
use crate::error::{IoResultExt as _, SafetyError, SafetyResult};

/// File name of the index at the root of a backup directory.
pub const INDEX_FILE_NAME: &str = ".backup_index.json";

/// Current on-disk index schema version.
pub const INDEX_VERSION: u32 = 1;

/// One historical backup of one target path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Absolute path of the file that was backed up.
    pub original_path: PathBuf,
    /// Absolute path of the stored artifact.
    pub backup_path: PathBuf,
    /// Hex SHA-256 of the original content at backup time.
    pub checksum: String,
    /// Size of the original content in bytes.
    pub original_size: u64,
    /// Whether the artifact is gzip-compressed.
    pub compressed: bool,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Naming scheme used for the artifact.
    pub format: BackupFormat,
}

/// Ordered ledger of backup records for one backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIndex {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    records: Vec<BackupRecord>,
}

const fn default_version() -> u32 {
    INDEX_VERSION
}

impl Default for BackupIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            records: Vec::new(),
        }
    }
}

/// Location of the index for backup directory `dir`.
#[must_use]
pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE_NAME)
}

impl BackupIndex {
    /// Load the index at `path`; a missing file yields an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::CorruptIndex`] if the file exists but cannot be
    /// parsed, or [`SafetyError::Io`] if it cannot be read.
    pub fn load(path: &Path) -> SafetyResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SafetyError::io(path, e)),
        };
        serde_json::from_str(&content).map_err(|e| SafetyError::CorruptIndex {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Atomically write the index to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn persist(&self, path: &Path) -> SafetyResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            SafetyError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        write_atomic(path, &json)
    }

    /// All records in chronological order.
    #[must_use]
    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Number of records across all targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record (it becomes the newest).
    pub fn append(&mut self, record: BackupRecord) {
        self.records.push(record);
    }

    /// Records for `target`, oldest first.
    pub fn records_for<'a>(&'a self, target: &'a Path) -> impl Iterator<Item = &'a BackupRecord> {
        self.records.iter().filter(move |r| r.original_path == target)
    }

    /// Most recent record for `target`.
    #[must_use]
    pub fn latest_for<'a>(&'a self, target: &'a Path) -> Option<&'a BackupRecord> {
        self.records_for(target).last()
    }

    /// Remove and return the oldest records for `target` so that at most
    /// `max_backups` remain.  `0` means unlimited.
    pub fn prune(&mut self, target: &Path, max_backups: usize) -> Vec<BackupRecord> {
        if max_backups == 0 {
            return Vec::new();
        }
        self.retain_newest(target, max_backups)
    }

    /// Remove and return the oldest records for `target` so that at most
    /// `keep` remain; `0` removes every record for `target`.
    pub fn retain_newest(&mut self, target: &Path, keep: usize) -> Vec<BackupRecord> {
        let count = self.records_for(target).count();
        if count <= keep {
            return Vec::new();
        }
        let mut to_evict = count - keep;
        let mut evicted = Vec::with_capacity(to_evict);
        self.records.retain(|r| {
            if to_evict > 0 && r.original_path == target {
                to_evict -= 1;
                evicted.push(r.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove and return records for `target` created before `cutoff`,
    /// except the one stored at `keep`.
    pub fn prune_older_than(
        &mut self,
        target: &Path,
        cutoff: DateTime<Utc>,
        keep: &Path,
    ) -> Vec<BackupRecord> {
        let mut evicted = Vec::new();
        self.records.retain(|r| {
            if r.original_path == target && r.created_at < cutoff && r.backup_path != keep {
                evicted.push(r.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove `target`'s record for the artifact at `backup_path`.  Other
    /// targets sharing that artifact keep their records.
    pub fn remove_by_backup_path(
        &mut self,
        target: &Path,
        backup_path: &Path,
    ) -> Option<BackupRecord> {
        let pos = self
            .records
            .iter()
            .position(|r| r.original_path == target && r.backup_path == backup_path)?;
        Some(self.records.remove(pos))
    }

    /// Whether any record still points at `backup_path`.
    #[must_use]
    pub fn is_referenced(&self, backup_path: &Path) -> bool {
        self.records.iter().any(|r| r.backup_path == backup_path)
    }

    /// Find the record whose artifact is `backup_path`.
    #[must_use]
    pub fn find_backup(&self, backup_path: &Path) -> Option<&BackupRecord> {
        self.records.iter().find(|r| r.backup_path == backup_path)
    }
}

/// Write the metadata sidecar for `record` next to its artifact.
///
/// # Errors
///
/// Returns an error if the sidecar cannot be serialized or written.
pub fn write_sidecar(record: &BackupRecord) -> SafetyResult<PathBuf> {
    let path = sidecar_path(&record.backup_path);
    let json = serde_json::to_vec_pretty(record).map_err(|e| {
        SafetyError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    write_atomic(&path, &json)?;
    Ok(path)
}

/// Read a metadata sidecar.  `path` may name either the sidecar itself or
/// the artifact it describes.
///
/// # Errors
///
/// Returns [`SafetyError::Io`] if the sidecar cannot be read and
/// [`SafetyError::CorruptIndex`] if it cannot be parsed.
pub fn read_sidecar(path: &Path) -> SafetyResult<BackupRecord> {
    let sidecar = if path.to_string_lossy().ends_with(SIDECAR_EXT) {
        path.to_path_buf()
    } else {
        sidecar_path(path)
    };
    let content = std::fs::read_to_string(&sidecar).at_path(&sidecar)?;
    serde_json::from_str(&content).map_err(|e| SafetyError::CorruptIndex {
        path: sidecar.clone(),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn record(target: &str, n: u32) -> BackupRecord {
        BackupRecord {
            original_path: PathBuf::from(target),
            backup_path: PathBuf::from(format!("/b/{n:03}")),
            checksum: format!("{n:064x}"),
            original_size: u64::from(n),
            compressed: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, n, 0, 0, 0).unwrap(),
            format: BackupFormat::Numbered,
        }
    }

    #[test]
    fn load_missing_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = BackupIndex::load(&index_path(dir.path())).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = index_path(dir.path());
        std::fs::write(&path, "{ not json").unwrap();
        let err = BackupIndex::load(&path).unwrap_err();
        assert!(matches!(err, SafetyError::CorruptIndex { .. }));
        assert!(err.to_string().contains(INDEX_FILE_NAME));
    }

    #[test]
    fn persist_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = index_path(dir.path());
        let mut index = BackupIndex::default();
        index.append(record("/h/a", 1));
        index.append(record("/h/b", 2));
        index.append(record("/h/a", 3));
        index.persist(&path).unwrap();

        let loaded = BackupIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.latest_for(Path::new("/h/a")).unwrap().original_size, 3);
    }

    #[test]
    fn prune_evicts_oldest_for_target_only() {
        let mut index = BackupIndex::default();
        for n in 1..=4 {
            index.append(record("/h/a", n));
        }
        index.append(record("/h/b", 5));

        let evicted = index.prune(Path::new("/h/a"), 2);
        let sizes: Vec<u64> = evicted.iter().map(|r| r.original_size).collect();
        assert_eq!(sizes, vec![1, 2]);
        assert_eq!(index.records_for(Path::new("/h/a")).count(), 2);
        assert_eq!(index.records_for(Path::new("/h/b")).count(), 1);
    }

    #[test]
    fn prune_zero_is_unlimited() {
        let mut index = BackupIndex::default();
        index.append(record("/h/a", 1));
        index.append(record("/h/a", 2));
        assert!(index.prune(Path::new("/h/a"), 0).is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn retain_newest_zero_removes_all_for_target() {
        let mut index = BackupIndex::default();
        index.append(record("/h/a", 1));
        index.append(record("/h/b", 2));
        assert_eq!(index.retain_newest(Path::new("/h/a"), 0).len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn prune_older_than_keeps_newest() {
        let mut index = BackupIndex::default();
        for n in 1..=3 {
            index.append(record("/h/a", n));
        }
        let cutoff = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let keep = PathBuf::from("/b/001");
        let evicted = index.prune_older_than(Path::new("/h/a"), cutoff, &keep);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].backup_path, PathBuf::from("/b/002"));
        assert!(index.find_backup(&keep).is_some());
    }

    #[test]
    fn remove_backup_by_path_leaves_other_targets_sharing_it() {
        let mut index = BackupIndex::default();
        index.append(record("/h/a", 1));
        let mut shared = record("/h/b", 2);
        shared.backup_path = PathBuf::from("/b/001");
        index.append(shared);

        assert!(index.remove_by_backup_path(Path::new("/h/a"), Path::new("/b/001")).is_some());
        assert!(index.remove_by_backup_path(Path::new("/h/a"), Path::new("/b/001")).is_none());
        assert!(index.is_referenced(Path::new("/b/001")));
        assert!(index.remove_by_backup_path(Path::new("/h/b"), Path::new("/b/001")).is_some());
        assert!(!index.is_referenced(Path::new("/b/001")));
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = record("/h/a", 1);
        rec.backup_path = dir.path().join("a.backup.001");
        std::fs::write(&rec.backup_path, "x").unwrap();

        let sidecar = write_sidecar(&rec).unwrap();
        assert!(sidecar.to_string_lossy().ends_with(".meta"));
        assert_eq!(read_sidecar(&sidecar).unwrap(), rec);
        assert_eq!(read_sidecar(&rec.backup_path).unwrap(), rec);
    }

    #[test]
    fn format_serializes_snake_case() {
        let json = serde_json::to_string(&record("/h/a", 1)).unwrap();
        assert!(json.contains("\"format\":\"numbered\""), "{json}");
        assert!(json.contains("\"original_path\""), "{json}");
    }
}
