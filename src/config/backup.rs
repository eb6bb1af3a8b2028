//! Backup policy configuration.
//!
//! The manifest carries a `[defaults.backup]` table and optional per-file
//! `backup` tables.  Both deserialize into [`RawBackupConfig`] (every field
//! optional) so a per-file table can override the defaults field by field;
//! [`RawBackupConfig::resolve`] then validates the merged result into an
//! [`EnhancedBackupConfig`].
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;

use crate::error::ValidationError;
use crate::platform::expand_path;
use crate::safety::naming::BackupFormat;

/// Backup directory used when none is configured.
pub const DEFAULT_BACKUP_DIRECTORY: &str = "~/.dotfiles-backups";

/// Number of artifacts kept per target when `max_backups` is absent.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Validated backup policy for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedBackupConfig {
    /// Whether backups are taken at all.
    pub enabled: bool,
    /// Absolute backup directory.
    pub directory: PathBuf,
    /// Artifact naming scheme.
    pub format: BackupFormat,
    /// Artifacts kept per target; `0` keeps everything.
    pub max_backups: usize,
    /// Gzip artifacts.
    pub compression: bool,
    /// Skip the backup when content matches the latest one.
    pub incremental: bool,
    /// Write a `.meta` sidecar next to each artifact.
    pub backup_metadata: bool,
    /// Maintain `.backup_index.json`.
    pub backup_index: bool,
    /// Prune artifacts older than this after each backup.
    pub retention_policy: Option<TimeDelta>,
}

impl EnhancedBackupConfig {
    /// A policy with every feature at its default, storing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            directory: directory.into(),
            format: BackupFormat::default(),
            max_backups: DEFAULT_MAX_BACKUPS,
            compression: false,
            incremental: true,
            backup_metadata: true,
            backup_index: true,
            retention_policy: None,
        }
    }

    /// A disabled policy.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(PathBuf::new())
        }
    }
}

/// Backup table as written in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBackupConfig {
    /// Whether backups are taken at all.
    pub enabled: Option<bool>,
    /// Storage directory; relative paths resolve against the manifest.
    pub directory: Option<String>,
    /// Naming format: `timestamped`, `numbered` or `git_style`.
    pub format: Option<String>,
    /// Backups kept per target; `0` keeps everything.
    pub max_backups: Option<i64>,
    /// Gzip artifacts.
    pub compression: Option<bool>,
    /// Skip the backup when content matches the latest one.
    pub incremental: Option<bool>,
    /// Write a `.meta` sidecar next to each artifact.
    pub metadata: Option<bool>,
    /// Maintain the directory index.
    pub index: Option<bool>,
    /// Maximum backup age, e.g. `30d` or `12h`.
    pub retention: Option<String>,
}

impl RawBackupConfig {
    /// Overlay `self` on `defaults`: fields set here win.
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            enabled: self.enabled.or(defaults.enabled),
            directory: self.directory.or_else(|| defaults.directory.clone()),
            format: self.format.or_else(|| defaults.format.clone()),
            max_backups: self.max_backups.or(defaults.max_backups),
            compression: self.compression.or(defaults.compression),
            incremental: self.incremental.or(defaults.incremental),
            metadata: self.metadata.or(defaults.metadata),
            index: self.index.or(defaults.index),
            retention: self.retention.or_else(|| defaults.retention.clone()),
        }
    }

    /// Validate and resolve into an [`EnhancedBackupConfig`].  A relative
    /// `directory` is taken relative to `base`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an unknown format, a negative
    /// `max_backups`, or a malformed retention duration.
    pub fn resolve(&self, base: &Path) -> Result<EnhancedBackupConfig, ValidationError> {
        let format = self
            .format
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();
        let max_backups = match self.max_backups {
            None => DEFAULT_MAX_BACKUPS,
            Some(n) if n < 0 => return Err(ValidationError::NegativeMaxBackups(n)),
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let retention_policy = self.retention.as_deref().map(parse_duration).transpose()?;
        let directory = expand_path(
            self.directory.as_deref().unwrap_or(DEFAULT_BACKUP_DIRECTORY),
            base,
        );

        Ok(EnhancedBackupConfig {
            enabled: self.enabled.unwrap_or(true),
            directory,
            format,
            max_backups,
            compression: self.compression.unwrap_or(false),
            incremental: self.incremental.unwrap_or(true),
            backup_metadata: self.metadata.unwrap_or(true),
            backup_index: self.index.unwrap_or(true),
            retention_policy,
        })
    }
}

/// Parse a retention duration such as `30d`, `12h`, `1w2d`, `90m` or `45s`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDuration`] if the string is empty, has a
/// component without a unit or with an unknown unit, or overflows.
pub fn parse_duration(raw: &str) -> Result<TimeDelta, ValidationError> {
    let invalid = || ValidationError::InvalidDuration(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total: i64 = 0;
    let mut number = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let unit: i64 = match c {
            'w' => 7 * 24 * 3600,
            'd' => 24 * 3600,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let value: i64 = number.parse().map_err(|_| invalid())?;
        number.clear();
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }
    if !number.is_empty() {
        return Err(invalid());
    }
    TimeDelta::try_seconds(total).ok_or_else(invalid)
}
