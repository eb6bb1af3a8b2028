//! Arbitration between a desired deployment and existing content.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use super::engine::{create_enhanced_backup, simple_backup};
use crate::config::backup::EnhancedBackupConfig;
use crate::error::{SafetyError, SafetyResult, Step, ValidationError, Warning};

/// What to do when the target already holds different content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ConflictStrategy {
    /// Preserve the existing content, then replace it.
    #[default]
    Backup,
    /// Replace without preserving.
    Overwrite,
    /// Leave the target alone.
    Skip,
    /// Ask the user.  Without an interactive channel the target is left
    /// alone and a warning is raised.
    Prompt,
}

impl FromStr for ConflictStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backup" => Ok(Self::Backup),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            "prompt" => Ok(Self::Prompt),
            _ => Err(ValidationError::UnknownConflictStrategy(s.to_string())),
        }
    }
}

impl TryFrom<String> for ConflictStrategy {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Prompt => "prompt",
        })
    }
}

/// The action a resolution settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Existing content was (or was attempted to be) preserved.
    Backup,
    /// Existing content will be replaced as-is.
    Overwrite,
    /// Target left alone.
    Skip,
    /// A user decision is required and none was available.
    PromptPending,
}

/// Outcome of [`ConflictResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResolution {
    /// The action taken.
    pub action: ConflictAction,
    /// Whether the caller may go ahead with its mutation.
    pub should_proceed: bool,
    /// Artifact preserving the previous content, if one exists.
    pub backup_path: Option<PathBuf>,
    /// Non-fatal problems (failed backups, unanswered prompts).
    pub warnings: Vec<Warning>,
}

impl ConflictResolution {
    fn new(action: ConflictAction, should_proceed: bool) -> Self {
        Self {
            action,
            should_proceed,
            backup_path: None,
            warnings: Vec::new(),
        }
    }
}

/// Applies a [`ConflictStrategy`] to a target path.
#[derive(Debug, Clone)]
pub struct ConflictResolver<'a> {
    backup: &'a EnhancedBackupConfig,
}

impl<'a> ConflictResolver<'a> {
    /// A resolver backing up according to `backup`.  When `backup` is
    /// disabled, the `backup` strategy falls back to a plain timestamped
    /// copy into the configured directory (or beside the target if none).
    #[must_use]
    pub const fn new(backup: &'a EnhancedBackupConfig) -> Self {
        Self { backup }
    }

    /// Resolve a conflict at `target` using a strategy given by name.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Conflict`] if `strategy` is not recognised.
    pub fn resolve_str(&self, target: &Path, strategy: &str) -> SafetyResult<ConflictResolution> {
        let strategy = strategy
            .parse()
            .map_err(|_| SafetyError::Conflict(strategy.to_string()))?;
        Ok(self.resolve(target, strategy))
    }

    /// Resolve a conflict at `target`.
    ///
    /// Backup failures never abort: they are reported as warnings and the
    /// caller still proceeds.
    #[must_use]
    pub fn resolve(&self, target: &Path, strategy: ConflictStrategy) -> ConflictResolution {
        debug!(target = %target.display(), %strategy, "resolving conflict");
        match strategy {
            ConflictStrategy::Backup => self.backup(target),
            ConflictStrategy::Overwrite => ConflictResolution::new(ConflictAction::Overwrite, true),
            ConflictStrategy::Skip => ConflictResolution::new(ConflictAction::Skip, false),
            ConflictStrategy::Prompt => {
                let mut resolution = ConflictResolution::new(ConflictAction::PromptPending, false);
                let warning = Warning::new(
                    target,
                    Step::Prompt,
                    "no interactive channel; target left unchanged",
                );
                warn!("{warning}");
                resolution.warnings.push(warning);
                resolution
            }
        }
    }

    fn backup(&self, target: &Path) -> ConflictResolution {
        let mut resolution = ConflictResolution::new(ConflictAction::Backup, true);
        if !target.exists() {
            return resolution;
        }

        let result = if self.backup.enabled {
            create_enhanced_backup(target, self.backup).map(|outcome| {
                resolution.warnings.extend(outcome.warnings);
                outcome.backup_path
            })
        } else {
            simple_backup(target, &self.legacy_directory(target)).map(Some)
        };

        match result {
            Ok(path) => resolution.backup_path = path,
            Err(e) => {
                let warning = Warning::new(target, Step::Conflict, e.to_string());
                warn!("{warning}");
                resolution.warnings.push(warning);
            }
        }
        resolution
    }

    fn legacy_directory(&self, target: &Path) -> PathBuf {
        if self.backup.directory.as_os_str().is_empty() {
            target
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        } else {
            self.backup.directory.clone()
        }
    }
}
