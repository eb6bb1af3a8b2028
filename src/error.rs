//! Domain-specific error types for the file-safety engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Engine modules return typed errors ([`SafetyError`], [`ValidationError`])
//! while command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! SafetyError
//! ├── Validation(ValidationError) : bad mode, pattern, format, strategy, engine
//! ├── Io { path, source }          : read/write/stat failures
//! ├── CorruptIndex { path, .. }    : index file exists but cannot be parsed
//! ├── Backup { step, path, .. }    : I/O failure with backup-step context
//! └── Conflict(String)             : unrecognised conflict strategy
//! ```
//!
//! Failures of the safety net itself (sidecar, index, pruning) are not
//! errors from the caller's point of view: they travel as [`Warning`] values
//! inside outcome types so the primary mutation can still proceed.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias for engine operations.
pub type SafetyResult<T> = Result<T, SafetyError>;

/// Top-level error type for the file-safety engine.
#[derive(Error, Debug)]
pub enum SafetyError {
    /// Configuration or input failed eager validation; no I/O was attempted.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Absolute path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The backup index (or a metadata sidecar) exists but cannot be parsed.
    #[error("corrupt backup metadata {}: {message}", .path.display())]
    CorruptIndex {
        /// Absolute path of the index or sidecar file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A backup step failed.
    #[error("backup failed during {step} for {}: {source}", .path.display())]
    Backup {
        /// Which step of the backup pipeline failed.
        step: Step,
        /// Absolute path of the file being backed up.
        path: PathBuf,
        /// Underlying failure.
        source: Box<SafetyError>,
    },

    /// The conflict strategy is not one of the recognised values.
    #[error("unknown conflict strategy '{0}'")]
    Conflict(String),
}

impl SafetyError {
    /// Build an [`SafetyError::Io`] for `path`.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wrap `self` with backup-step context.
    #[must_use]
    pub fn during(self, step: Step, path: &Path) -> Self {
        Self::Backup {
            step,
            path: path.to_path_buf(),
            source: Box::new(self),
        }
    }
}

/// Attach an absolute path to an [`std::io::Result`].
pub trait IoResultExt<T> {
    /// Convert the I/O error into [`SafetyError::Io`] naming `path`.
    ///
    /// # Errors
    ///
    /// Returns the converted error when `self` is `Err`.
    fn at_path(self, path: &Path) -> SafetyResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> SafetyResult<T> {
        self.map_err(|e| SafetyError::io(path, e))
    }
}

/// Errors detected eagerly while building configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A permission mode is not valid octal in `[0, 0o777]`.
    #[error("invalid permission mode '{0}': expected octal between 0000 and 0777")]
    InvalidMode(String),

    /// A permission rule pattern is not a valid glob.
    #[error("invalid permission pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Glob compiler message.
        message: String,
    },

    /// The backup format is not one of `timestamped`, `numbered`, `git_style`.
    #[error("unknown backup format '{0}': must be one of timestamped, numbered, git_style")]
    UnknownBackupFormat(String),

    /// The conflict strategy is not one of `backup`, `overwrite`, `skip`, `prompt`.
    #[error("unknown conflict strategy '{0}': must be one of backup, overwrite, skip, prompt")]
    UnknownConflictStrategy(String),

    /// The template engine identifier is not recognised.
    #[error("unknown template engine '{0}': must be one of simple, raw")]
    UnknownTemplateEngine(String),

    /// The deploy method is not recognised.
    #[error("unknown deploy method '{0}': must be one of symlink, copy, template")]
    UnknownMethod(String),

    /// `max_backups` was negative.
    #[error("max_backups must not be negative (got {0})")]
    NegativeMaxBackups(i64),

    /// A retention duration could not be parsed.
    #[error("invalid duration '{0}': expected e.g. 30d, 12h, 1w2d, 90m")]
    InvalidDuration(String),

    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(String),
}

/// Step of the safety pipeline a failure or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Writing the backup artifact.
    Artifact,
    /// Writing the metadata sidecar.
    Sidecar,
    /// Loading or persisting the backup index.
    Index,
    /// Retention pruning.
    Prune,
    /// Conflict arbitration.
    Conflict,
    /// Interactive prompt that could not be answered.
    Prompt,
    /// Restoring a backup artifact.
    Restore,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Artifact => "artifact write",
            Self::Sidecar => "sidecar write",
            Self::Index => "index update",
            Self::Prune => "pruning",
            Self::Conflict => "conflict resolution",
            Self::Prompt => "prompt",
            Self::Restore => "restore",
        };
        f.write_str(s)
    }
}

/// A non-fatal failure of the safety net.
///
/// Carried alongside successful results so callers can surface
/// reduced-safety conditions without aborting the requested change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Absolute path of the file the warning concerns.
    pub path: PathBuf,
    /// Step that failed.
    pub step: Step,
    /// Human-readable detail.
    pub message: String,
}

impl Warning {
    /// Create a warning.
    #[must_use]
    pub fn new(path: &Path, step: Step, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {}: {}",
            self.step,
            self.path.display(),
            self.message
        )
    }
}
