//! The backup pipeline.
//!
//! [`create_enhanced_backup`] reads the target once, decides whether a new
//! artifact is needed, writes it crash-safely, then records it in the
//! sidecar and index and enforces retention.  Only the artifact write is
//! fatal; every later step degrades to a [`Warning`].
//!
//! The remaining entry points ([`simple_backup`], [`restore`], [`list`],
//! [`prune`]) back the CLI and the conflict resolver's legacy path.
use std::fmt;
use std::fs::Permissions;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

use super::atomic::write_atomic_with;
use super::checksum::{digest_artifact, digest_bytes};
use super::index::{BackupIndex, BackupRecord, index_path, read_sidecar, write_sidecar};
use super::lock;
use super::naming::{
    BackupFormat, COMPRESSED_EXT, SIDECAR_EXT, basename, existing_artifacts, plan_name,
    sidecar_path,
};
use crate::config::backup::EnhancedBackupConfig;
use crate::error::{IoResultExt as _, SafetyError, SafetyResult, Step, ValidationError, Warning};

/// What a backup call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    /// A new artifact was written.
    Created,
    /// Content matches the latest backup of this target; nothing written.
    Unchanged,
    /// Identical content is already stored under the same name.
    Deduplicated,
    /// Backups are turned off.
    Disabled,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Deduplicated => "deduplicated",
            Self::Disabled => "disabled",
        })
    }
}

/// Result of [`create_enhanced_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// What happened.
    pub status: BackupStatus,
    /// The artifact holding the target's current content, if any.
    pub backup_path: Option<PathBuf>,
    /// Non-fatal failures of the sidecar, index or retention steps.
    pub warnings: Vec<Warning>,
}

impl BackupOutcome {
    fn new(status: BackupStatus, backup_path: Option<PathBuf>, warnings: Vec<Warning>) -> Self {
        Self {
            status,
            backup_path,
            warnings,
        }
    }

    /// Whether a new artifact was written by this call.
    #[must_use]
    pub fn created(&self) -> bool {
        self.status == BackupStatus::Created
    }
}

/// Result of [`prune`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Artifacts deleted from disk.
    pub removed: Vec<PathBuf>,
    /// Artifacts or sidecars that could not be deleted.
    pub warnings: Vec<Warning>,
}

/// Back up `target` according to `config`.
///
/// # Errors
///
/// Returns [`SafetyError::Backup`] with [`Step::Artifact`] if the target
/// cannot be read or the artifact cannot be written.  The index is never
/// touched in that case.
pub fn create_enhanced_backup(
    target: &Path,
    config: &EnhancedBackupConfig,
) -> SafetyResult<BackupOutcome> {
    create_enhanced_backup_at(target, config, Utc::now())
}

/// [`create_enhanced_backup`] with an explicit clock.
///
/// # Errors
///
/// See [`create_enhanced_backup`].
pub fn create_enhanced_backup_at(
    target: &Path,
    config: &EnhancedBackupConfig,
    now: DateTime<Utc>,
) -> SafetyResult<BackupOutcome> {
    if !config.enabled {
        debug!(target = %target.display(), "backups disabled");
        return Ok(BackupOutcome::new(BackupStatus::Disabled, None, Vec::new()));
    }

    let target = std::path::absolute(target).at_path(target)?;
    let fail = |e: SafetyError| e.during(Step::Artifact, &target);

    let bytes = std::fs::read(&target).at_path(&target).map_err(fail)?;
    let permissions = std::fs::metadata(&target)
        .at_path(&target)
        .map_err(fail)?
        .permissions();
    let checksum = digest_bytes(&bytes);
    let dir = config.directory.as_path();
    std::fs::create_dir_all(dir).at_path(dir).map_err(fail)?;

    let dir_lock = lock::for_directory(dir);
    let _held = lock::hold(&dir_lock);
    let mut warnings = Vec::new();

    let index_file = index_path(dir);
    let mut index = if config.backup_index {
        match BackupIndex::load(&index_file) {
            Ok(index) => Some(index),
            Err(e) => {
                note(&mut warnings, Warning::new(&index_file, Step::Index, e.to_string()));
                None
            }
        }
    } else {
        None
    };

    if config.incremental
        && let Some(latest) = latest_backup(dir, &target, index.as_ref())
        && latest.checksum == checksum
    {
        debug!(target = %target.display(), backup = %latest.path.display(), "content unchanged");
        return Ok(BackupOutcome::new(
            BackupStatus::Unchanged,
            Some(latest.path),
            warnings,
        ));
    }

    // With an index, identical content is shared across targets and kept
    // alive by reference.  Without one, only the owner's artifact is reused.
    let shared = index.is_some();
    let planned = plan_name(
        dir,
        &target,
        config.format,
        &checksum,
        now,
        config.compression,
        |path| shared || owner_of(path).as_deref() == Some(target.as_path()),
    )
    .map_err(fail)?;

    let status = if planned.already_exists {
        debug!(backup = %planned.path.display(), "identical content already stored");
        BackupStatus::Deduplicated
    } else {
        write_artifact(&planned.path, &bytes, config.compression, &permissions).map_err(fail)?;
        debug!(target = %target.display(), backup = %planned.path.display(), "backup written");
        BackupStatus::Created
    };

    let record = BackupRecord {
        original_path: target.clone(),
        backup_path: planned.path.clone(),
        checksum,
        original_size: bytes.len() as u64,
        compressed: config.compression,
        created_at: now,
        format: planned.variant.format(),
    };

    // A reused artifact's sidecar is refreshed only by the target it
    // describes, so its timestamp orders it as that target's newest backup.
    if config.backup_metadata
        && (status == BackupStatus::Created
            || owner_of(&planned.path).as_deref() == Some(target.as_path()))
        && let Err(e) = write_sidecar(&record)
    {
        note(
            &mut warnings,
            Warning::new(&sidecar_path(&planned.path), Step::Sidecar, e.to_string()),
        );
    }

    let cutoff = config.retention_policy.map(|age| now - age);
    let evicted: Vec<PathBuf> = if let Some(index) = index.as_mut() {
        // Re-backing up stored content moves this target's record to the
        // newest position instead of duplicating it.
        index.remove_by_backup_path(&target, &planned.path);
        index.append(record);
        let mut evicted = index.prune(&target, config.max_backups);
        if let Some(cutoff) = cutoff {
            evicted.extend(index.prune_older_than(&target, cutoff, &planned.path));
        }
        match index.persist(&index_file) {
            Ok(()) => unreferenced(index, evicted),
            Err(e) => {
                // Evicted records are still on disk in the old index; keep their artifacts.
                note(&mut warnings, Warning::new(&index_file, Step::Index, e.to_string()));
                Vec::new()
            }
        }
    } else {
        scan_evictions(
            dir,
            &target,
            &planned.path,
            config.max_backups,
            cutoff,
            &mut warnings,
        )
        .unwrap_or_else(|e| {
            note(&mut warnings, Warning::new(dir, Step::Prune, e.to_string()));
            Vec::new()
        })
    };
    for artifact in &evicted {
        remove_artifact(artifact, &mut warnings);
    }

    Ok(BackupOutcome::new(status, Some(planned.path), warnings))
}

/// Legacy backup: a raw, timestamped copy of `target` into `dir` with no
/// deduplication, sidecar, index or retention.
///
/// # Errors
///
/// Returns [`SafetyError::Backup`] if the target cannot be read or the copy
/// cannot be written.
pub fn simple_backup(target: &Path, dir: &Path) -> SafetyResult<PathBuf> {
    let target = std::path::absolute(target).at_path(target)?;
    let fail = |e: SafetyError| e.during(Step::Artifact, &target);

    let bytes = std::fs::read(&target).at_path(&target).map_err(fail)?;
    let permissions = std::fs::metadata(&target)
        .at_path(&target)
        .map_err(fail)?
        .permissions();
    std::fs::create_dir_all(dir).at_path(dir).map_err(fail)?;

    let dir_lock = lock::for_directory(dir);
    let _held = lock::hold(&dir_lock);
    let planned = plan_name(
        dir,
        &target,
        BackupFormat::Timestamped,
        "",
        Utc::now(),
        false,
        |_| false,
    )
    .map_err(fail)?;
    write_artifact(&planned.path, &bytes, false, &permissions).map_err(fail)?;
    debug!(target = %target.display(), backup = %planned.path.display(), "simple backup written");
    Ok(planned.path)
}

/// Restore `artifact` to `destination`, or to the original path recorded in
/// its sidecar or index when `destination` is `None`.
///
/// Compressed artifacts are decompressed.  When a recorded checksum exists
/// the restored content must match it.  Returns the path written.
///
/// # Errors
///
/// Returns [`SafetyError::Backup`] with [`Step::Restore`] if the artifact
/// cannot be read, fails verification, or the destination cannot be written,
/// and a validation error if no destination is known.
pub fn restore(artifact: &Path, destination: Option<&Path>) -> SafetyResult<PathBuf> {
    let artifact = std::path::absolute(artifact).at_path(artifact)?;
    let fail = |e: SafetyError| e.during(Step::Restore, &artifact);

    let record = find_record(&artifact);
    let destination = match (destination, &record) {
        (Some(dest), _) => std::path::absolute(dest).at_path(dest)?,
        (None, Some(record)) => record.original_path.clone(),
        (None, None) => {
            return Err(ValidationError::MissingField("destination".to_string()).into());
        }
    };
    let compressed = record.as_ref().map_or_else(
        || artifact.to_string_lossy().ends_with(COMPRESSED_EXT),
        |r| r.compressed,
    );

    let raw = std::fs::read(&artifact).at_path(&artifact).map_err(fail)?;
    let bytes = if compressed {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .at_path(&artifact)
            .map_err(fail)?;
        out
    } else {
        raw
    };

    if let Some(record) = &record {
        let actual = digest_bytes(&bytes);
        if actual != record.checksum {
            return Err(fail(SafetyError::CorruptIndex {
                path: artifact.clone(),
                message: format!("checksum mismatch: expected {}, got {actual}", record.checksum),
            }));
        }
    }

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).at_path(parent).map_err(fail)?;
    }
    let permissions = std::fs::metadata(&artifact)
        .at_path(&artifact)
        .map_err(fail)?
        .permissions();
    write_artifact(&destination, &bytes, false, &permissions).map_err(fail)?;
    debug!(artifact = %artifact.display(), destination = %destination.display(), "restored");
    Ok(destination)
}

/// Backup records stored in `dir`, oldest first, optionally only those of
/// `target`.
///
/// The index is authoritative; without one, sidecars are read instead.
///
/// # Errors
///
/// Returns an error if the index is corrupt or the directory cannot be read.
pub fn list(dir: &Path, target: Option<&Path>) -> SafetyResult<Vec<BackupRecord>> {
    let index = BackupIndex::load(&index_path(dir))?;
    let mut records: Vec<BackupRecord> = if index.is_empty() {
        scan_sidecars(dir)?
    } else {
        index.records().to_vec()
    };
    if let Some(target) = target {
        records.retain(|r| r.original_path == target);
    }
    Ok(records)
}

/// Delete all but the newest `keep` backups of `target` from `dir`.
///
/// # Errors
///
/// Returns an error if the index is corrupt or cannot be persisted, or the
/// directory cannot be scanned.
pub fn prune(dir: &Path, target: &Path, keep: usize) -> SafetyResult<PruneOutcome> {
    let dir_lock = lock::for_directory(dir);
    let _held = lock::hold(&dir_lock);

    let index_file = index_path(dir);
    let mut index = BackupIndex::load(&index_file)?;
    let mut outcome = PruneOutcome::default();
    let evicted: Vec<PathBuf> = if index.records_for(target).next().is_some() {
        let evicted = index.retain_newest(target, keep);
        index.persist(&index_file)?;
        unreferenced(&index, evicted)
    } else {
        let mut owned: Vec<PathBuf> = owned_artifacts(dir, target, None, &mut outcome.warnings)?
            .into_iter()
            .map(|r| r.backup_path)
            .collect();
        let excess = owned.len().saturating_sub(keep);
        owned.truncate(excess);
        owned
    };

    for artifact in evicted {
        if remove_artifact(&artifact, &mut outcome.warnings) {
            outcome.removed.push(artifact);
        }
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Latest {
    path: PathBuf,
    checksum: String,
}

/// The most recent backup of `target` whose artifact still exists.
fn latest_backup(dir: &Path, target: &Path, index: Option<&BackupIndex>) -> Option<Latest> {
    if let Some(index) = index {
        return index
            .latest_for(target)
            .filter(|r| r.backup_path.exists())
            .map(|r| Latest {
                path: r.backup_path.clone(),
                checksum: r.checksum.clone(),
            });
    }
    let newest = owned_artifacts(dir, target, None, &mut Vec::new())
        .ok()?
        .pop()?;
    let checksum = digest_artifact(&newest.backup_path, newest.compressed).ok()?;
    Some(Latest {
        path: newest.backup_path,
        checksum,
    })
}

/// The target a stored artifact's sidecar attributes it to.
fn owner_of(artifact: &Path) -> Option<PathBuf> {
    read_sidecar(artifact).ok().map(|r| r.original_path)
}

/// Evicted artifacts that no remaining index record points at.
fn unreferenced(index: &BackupIndex, evicted: Vec<BackupRecord>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = evicted
        .into_iter()
        .map(|r| r.backup_path)
        .filter(|p| !index.is_referenced(p))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Sidecar records of the artifacts in `dir` that belong to `target`,
/// oldest first, skipping `exclude`.
///
/// Artifacts sharing the basename but lacking a readable sidecar cannot be
/// attributed; they are reported once as a prune warning and never
/// returned, so retention cannot reach another target's backups.
fn owned_artifacts(
    dir: &Path,
    target: &Path,
    exclude: Option<&Path>,
    warnings: &mut Vec<Warning>,
) -> SafetyResult<Vec<BackupRecord>> {
    let mut owned = Vec::new();
    let mut unattributed = 0usize;
    for artifact in existing_artifacts(dir, &basename(target))? {
        if exclude == Some(artifact.as_path()) {
            continue;
        }
        match read_sidecar(&artifact) {
            Ok(record) if record.original_path == target => owned.push(BackupRecord {
                backup_path: artifact,
                ..record
            }),
            Ok(_) => {}
            Err(_) => unattributed += 1,
        }
    }
    if unattributed > 0 {
        let message = format!(
            "{unattributed} artifact(s) named after {} have no readable metadata; left in place",
            basename(target)
        );
        note(warnings, Warning::new(dir, Step::Prune, message));
    }
    owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(owned)
}

/// Retention without an index: count and age limits over `target`'s own
/// artifacts on disk, never evicting `newest`.
fn scan_evictions(
    dir: &Path,
    target: &Path,
    newest: &Path,
    max_backups: usize,
    cutoff: Option<DateTime<Utc>>,
    warnings: &mut Vec<Warning>,
) -> SafetyResult<Vec<PathBuf>> {
    if max_backups == 0 && cutoff.is_none() {
        return Ok(Vec::new());
    }
    let older = owned_artifacts(dir, target, Some(newest), warnings)?;
    // `newest` always occupies one of the slots.
    let excess = if max_backups == 0 {
        0
    } else {
        older.len().saturating_sub(max_backups - 1)
    };

    Ok(older
        .into_iter()
        .enumerate()
        .filter(|(i, r)| *i < excess || cutoff.is_some_and(|c| r.created_at < c))
        .map(|(_, r)| r.backup_path)
        .collect())
}

/// Every readable sidecar in `dir`, oldest first.
fn scan_sidecars(dir: &Path) -> SafetyResult<Vec<BackupRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).at_path(dir)? {
        let path = entry.at_path(dir)?.path();
        if !path.to_string_lossy().ends_with(SIDECAR_EXT) {
            continue;
        }
        match read_sidecar(&path) {
            Ok(record) => records.push(record),
            Err(e) => debug!(sidecar = %path.display(), error = %e, "skipping unreadable sidecar"),
        }
    }
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(records)
}

/// Metadata for `artifact`: its sidecar, else its directory's index.
fn find_record(artifact: &Path) -> Option<BackupRecord> {
    if let Ok(record) = read_sidecar(artifact) {
        return Some(record);
    }
    let dir = artifact.parent()?;
    BackupIndex::load(&index_path(dir))
        .ok()?
        .find_backup(artifact)
        .cloned()
}

fn write_artifact(
    path: &Path,
    bytes: &[u8],
    compress: bool,
    permissions: &Permissions,
) -> SafetyResult<()> {
    write_atomic_with(path, |file| {
        file.set_permissions(permissions.clone())?;
        if compress {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?;
            Ok(())
        } else {
            file.write_all(bytes)
        }
    })
}

/// Delete an artifact and its sidecar; returns whether the artifact is gone.
fn remove_artifact(artifact: &Path, warnings: &mut Vec<Warning>) -> bool {
    let removed = match std::fs::remove_file(artifact) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            note(warnings, Warning::new(artifact, Step::Prune, e.to_string()));
            false
        }
    };
    let sidecar = sidecar_path(artifact);
    match std::fs::remove_file(&sidecar) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            note(warnings, Warning::new(&sidecar, Step::Prune, e.to_string()));
        }
        _ => {}
    }
    if removed {
        debug!(artifact = %artifact.display(), "pruned");
    }
    removed
}

fn note(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{warning}");
    warnings.push(warning);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone as _};

    struct Fixture {
        _tmp: tempfile::TempDir,
        target: PathBuf,
        config: EnhancedBackupConfig,
    }

    fn fixture(format: BackupFormat) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("home").join(".bashrc");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "export A=1\n").unwrap();
        let mut config = EnhancedBackupConfig::new(tmp.path().join("backups"));
        config.format = format;
        config.max_backups = 0;
        Fixture {
            _tmp: tmp,
            target,
            config,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn artifact_count(f: &Fixture) -> usize {
        existing_artifacts(&f.config.directory, ".bashrc").unwrap().len()
    }

    // ------------------------------------------------------------------
    // create_enhanced_backup
    // ------------------------------------------------------------------

    #[test]
    fn disabled_writes_nothing() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.enabled = false;
        let out = create_enhanced_backup(&f.target, &f.config).unwrap();
        assert_eq!(out.status, BackupStatus::Disabled);
        assert!(out.backup_path.is_none());
        assert!(!f.config.directory.exists());
    }

    #[test]
    fn first_backup_writes_artifact_sidecar_and_index() {
        let f = fixture(BackupFormat::Numbered);
        let out = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        assert_eq!(out.status, BackupStatus::Created);
        assert!(out.warnings.is_empty());

        let path = out.backup_path.unwrap();
        assert!(path.ends_with(".bashrc.backup.001"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export A=1\n");

        let rec = read_sidecar(&path).unwrap();
        assert_eq!(rec.original_path, f.target);
        assert_eq!(rec.checksum, digest_bytes(b"export A=1\n"));
        assert_eq!(rec.original_size, 11);
        assert_eq!(rec.created_at, t(0));

        let index = BackupIndex::load(&index_path(&f.config.directory)).unwrap();
        assert_eq!(index.records(), &[rec]);
    }

    #[test]
    fn unchanged_content_is_skipped() {
        let f = fixture(BackupFormat::Numbered);
        let first = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let second = create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();
        assert_eq!(second.status, BackupStatus::Unchanged);
        assert_eq!(second.backup_path, first.backup_path);
        assert_eq!(artifact_count(&f), 1);
    }

    #[test]
    fn changed_content_creates_new_artifact() {
        let f = fixture(BackupFormat::Numbered);
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        std::fs::write(&f.target, "export A=2\n").unwrap();
        let out = create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();
        assert_eq!(out.status, BackupStatus::Created);
        assert!(out.backup_path.unwrap().ends_with(".bashrc.backup.002"));
    }

    #[test]
    fn non_incremental_always_writes() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.incremental = false;
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();
        assert_eq!(artifact_count(&f), 2);
    }

    #[test]
    fn git_style_reuses_identical_content() {
        let mut f = fixture(BackupFormat::GitStyle);
        f.config.incremental = false;
        let first = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let second = create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();
        assert_eq!(second.status, BackupStatus::Deduplicated);
        assert_eq!(second.backup_path, first.backup_path);
    }

    #[test]
    fn compressed_artifact_restores_byte_identical() {
        let mut f = fixture(BackupFormat::Timestamped);
        f.config.compression = true;
        let out = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let path = out.backup_path.unwrap();
        assert!(path.to_string_lossy().ends_with(".gz"));
        assert_eq!(
            digest_artifact(&path, true).unwrap(),
            digest_bytes(b"export A=1\n")
        );

        std::fs::write(&f.target, "clobbered").unwrap();
        restore(&path, None).unwrap();
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "export A=1\n");
    }

    #[test]
    fn retention_bounds_artifact_count() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.max_backups = 2;
        for n in 0..5 {
            std::fs::write(&f.target, format!("v{n}")).unwrap();
            create_enhanced_backup_at(&f.target, &f.config, t(n)).unwrap();
        }
        let left = existing_artifacts(&f.config.directory, ".bashrc").unwrap();
        assert_eq!(left.len(), 2);
        assert!(left[0].ends_with(".bashrc.backup.004"));
        assert!(left[1].ends_with(".bashrc.backup.005"));
        assert!(!sidecar_path(&f.config.directory.join(".bashrc.backup.001")).exists());
        let index = BackupIndex::load(&index_path(&f.config.directory)).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn age_retention_prunes_old_records() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.retention_policy = Some(TimeDelta::days(1));
        std::fs::write(&f.target, "old").unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        std::fs::write(&f.target, "new").unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(3 * 86_400)).unwrap();

        let left = existing_artifacts(&f.config.directory, ".bashrc").unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].ends_with(".bashrc.backup.002"));
    }

    #[test]
    fn without_index_dedupe_and_retention_scan_disk() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.backup_index = false;
        f.config.max_backups = 1;
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let again = create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();
        assert_eq!(again.status, BackupStatus::Unchanged);

        std::fs::write(&f.target, "changed").unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(2)).unwrap();
        assert_eq!(artifact_count(&f), 1);
        assert!(!index_path(&f.config.directory).exists());
    }

    #[test]
    fn corrupt_index_is_a_warning() {
        let f = fixture(BackupFormat::Numbered);
        std::fs::create_dir_all(&f.config.directory).unwrap();
        std::fs::write(index_path(&f.config.directory), "garbage").unwrap();

        let out = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        assert_eq!(out.status, BackupStatus::Created);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].step, Step::Index);
        assert_eq!(
            std::fs::read_to_string(index_path(&f.config.directory)).unwrap(),
            "garbage"
        );
    }

    #[test]
    fn missing_target_fails_at_artifact_step() {
        let f = fixture(BackupFormat::Numbered);
        std::fs::remove_file(&f.target).unwrap();
        let err = create_enhanced_backup(&f.target, &f.config).unwrap_err();
        assert!(matches!(
            err,
            SafetyError::Backup {
                step: Step::Artifact,
                ..
            }
        ));
        assert!(!index_path(&f.config.directory).exists());
    }

    fn twin(f: &Fixture, content: &str) -> PathBuf {
        let other = f.config.directory.with_file_name("other").join(".bashrc");
        std::fs::create_dir_all(other.parent().unwrap()).unwrap();
        std::fs::write(&other, content).unwrap();
        other
    }

    fn stored_contents(f: &Fixture) -> Vec<String> {
        let mut contents: Vec<String> = existing_artifacts(&f.config.directory, ".bashrc")
            .unwrap()
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        contents
    }

    #[test]
    fn reverted_content_counts_as_newest_for_retention() {
        let mut f = fixture(BackupFormat::GitStyle);
        f.config.max_backups = 2;
        let mut statuses = Vec::new();
        for (n, content) in (0..).zip(["v1", "v2", "v1", "v3"]) {
            std::fs::write(&f.target, content).unwrap();
            let out = create_enhanced_backup_at(&f.target, &f.config, t(n)).unwrap();
            statuses.push(out.status);
        }
        assert_eq!(
            statuses,
            [
                BackupStatus::Created,
                BackupStatus::Created,
                BackupStatus::Deduplicated,
                BackupStatus::Created
            ]
        );
        assert_eq!(stored_contents(&f), ["v1", "v3"]);
        let index = BackupIndex::load(&index_path(&f.config.directory)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.records()[0].created_at, t(2));
    }

    #[test]
    fn reverted_content_without_index_refreshes_sidecar() {
        let mut f = fixture(BackupFormat::GitStyle);
        f.config.max_backups = 2;
        f.config.backup_index = false;
        for (n, content) in (0..).zip(["v1", "v2", "v1", "v3"]) {
            std::fs::write(&f.target, content).unwrap();
            create_enhanced_backup_at(&f.target, &f.config, t(n)).unwrap();
        }
        assert_eq!(stored_contents(&f), ["v1", "v3"]);
    }

    #[test]
    fn shared_artifact_outlives_one_owners_retention() {
        let mut f = fixture(BackupFormat::GitStyle);
        f.config.max_backups = 1;
        let other = twin(&f, "export A=1\n");

        let mine = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let theirs = create_enhanced_backup_at(&other, &f.config, t(1)).unwrap();
        assert_eq!(theirs.status, BackupStatus::Deduplicated);
        assert_eq!(theirs.backup_path, mine.backup_path);

        std::fs::write(&f.target, "export A=2\n").unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(2)).unwrap();

        let shared = theirs.backup_path.unwrap();
        assert!(shared.exists());
        let records = list(&f.config.directory, Some(&other)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].backup_path, shared);
    }

    #[test]
    fn identical_content_of_another_target_is_not_shared_without_index() {
        let mut f = fixture(BackupFormat::GitStyle);
        f.config.backup_index = false;
        f.config.max_backups = 1;
        let other = twin(&f, "export A=1\n");

        let mine = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let theirs = create_enhanced_backup_at(&other, &f.config, t(1)).unwrap();
        assert_eq!(theirs.status, BackupStatus::Created);
        assert_ne!(theirs.backup_path, mine.backup_path);

        std::fs::write(&f.target, "export A=2\n").unwrap();
        create_enhanced_backup_at(&f.target, &f.config, t(2)).unwrap();
        assert!(theirs.backup_path.unwrap().exists());
    }

    #[test]
    fn retention_without_index_spares_same_named_targets() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.backup_index = false;
        f.config.max_backups = 1;
        let other = twin(&f, "other\n");

        let mine = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let theirs = create_enhanced_backup_at(&other, &f.config, t(1)).unwrap();

        assert!(theirs.warnings.is_empty());
        assert!(mine.backup_path.unwrap().exists());
        assert!(theirs.backup_path.unwrap().exists());
    }

    #[test]
    fn retention_without_any_metadata_warns_instead_of_deleting() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.backup_index = false;
        f.config.backup_metadata = false;
        f.config.max_backups = 1;
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        std::fs::write(&f.target, "export A=2\n").unwrap();

        let out = create_enhanced_backup_at(&f.target, &f.config, t(1)).unwrap();

        assert_eq!(artifact_count(&f), 2);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].step, Step::Prune);
    }

    // ------------------------------------------------------------------
    // simple_backup / restore / list / prune
    // ------------------------------------------------------------------

    #[test]
    fn simple_backup_copies_without_metadata() {
        let f = fixture(BackupFormat::Numbered);
        let path = simple_backup(&f.target, &f.config.directory).unwrap();
        assert!(path.to_string_lossy().contains(".bashrc.backup."));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export A=1\n");
        assert!(!sidecar_path(&path).exists());
        assert!(!index_path(&f.config.directory).exists());
    }

    #[test]
    fn restore_to_explicit_destination() {
        let f = fixture(BackupFormat::Numbered);
        let out = create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let dest = f.config.directory.parent().unwrap().join("restored");
        let written = restore(&out.backup_path.unwrap(), Some(&dest)).unwrap();
        assert_eq!(written, dest);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "export A=1\n");
    }

    #[test]
    fn restore_rejects_tampered_artifact() {
        let f = fixture(BackupFormat::Numbered);
        let path = create_enhanced_backup_at(&f.target, &f.config, t(0))
            .unwrap()
            .backup_path
            .unwrap();
        std::fs::write(&path, "tampered").unwrap();
        let err = restore(&path, None).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert_eq!(std::fs::read_to_string(&f.target).unwrap(), "export A=1\n");
    }

    #[test]
    fn restore_without_metadata_needs_destination() {
        let f = fixture(BackupFormat::Numbered);
        let path = simple_backup(&f.target, &f.config.directory).unwrap();
        let err = restore(&path, None).unwrap_err();
        assert!(matches!(
            err,
            SafetyError::Validation(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn list_filters_by_target() {
        let f = fixture(BackupFormat::Numbered);
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let other = f.target.with_file_name(".vimrc");
        std::fs::write(&other, "set nu").unwrap();
        create_enhanced_backup_at(&other, &f.config, t(1)).unwrap();

        assert_eq!(list(&f.config.directory, None).unwrap().len(), 2);
        let only = list(&f.config.directory, Some(&other)).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].original_path, other);
    }

    #[test]
    fn list_falls_back_to_sidecars() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.backup_index = false;
        create_enhanced_backup_at(&f.target, &f.config, t(0)).unwrap();
        let records = list(&f.config.directory, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_path, f.target);
    }

    #[test]
    fn manual_prune_keeps_newest() {
        let f = fixture(BackupFormat::Numbered);
        for n in 0..3 {
            std::fs::write(&f.target, format!("v{n}")).unwrap();
            create_enhanced_backup_at(&f.target, &f.config, t(n)).unwrap();
        }
        let out = prune(&f.config.directory, &f.target, 1).unwrap();
        assert_eq!(out.removed.len(), 2);
        assert!(out.warnings.is_empty());
        let left = existing_artifacts(&f.config.directory, ".bashrc").unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].ends_with(".bashrc.backup.003"));
    }

    #[test]
    fn manual_prune_without_index_only_touches_target() {
        let mut f = fixture(BackupFormat::Numbered);
        f.config.backup_index = false;
        let other = twin(&f, "other\n");
        for n in 0..3 {
            std::fs::write(&f.target, format!("v{n}")).unwrap();
            create_enhanced_backup_at(&f.target, &f.config, t(n)).unwrap();
        }
        let theirs = create_enhanced_backup_at(&other, &f.config, t(10)).unwrap();

        let out = prune(&f.config.directory, &f.target, 1).unwrap();

        assert_eq!(out.removed.len(), 2);
        assert!(theirs.backup_path.unwrap().exists());
        let mine = list(&f.config.directory, Some(&f.target)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(std::fs::read_to_string(&mine[0].backup_path).unwrap(), "v2");
    }
}
