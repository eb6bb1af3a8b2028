//! Backup artifact naming.
//!
//! Artifacts are named `<basename>.backup.<suffix>[.gz]` where the suffix
//! depends on the [`NameVariant`]:
//!
//! | format        | suffix                              |
//! |---------------|-------------------------------------|
//! | `timestamped` | `20261019T101530123Z` (UTC, millis) |
//! | `numbered`    | `001`, `002`, …                     |
//! | `git_style`   | first 8 hex chars of the checksum   |
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checksum::short_hash;
use crate::error::{IoResultExt as _, SafetyResult, ValidationError};

/// Separator between the original file name and the variant suffix.
pub const BACKUP_MARKER: &str = ".backup.";

/// Extension appended to compressed artifacts.
pub const COMPRESSED_EXT: &str = ".gz";

/// Extension of metadata sidecars (appended to the artifact name).
pub const SIDECAR_EXT: &str = ".meta";

/// Marker carried by in-flight temporary files; such files are never
/// treated as artifacts.
pub const TEMP_MARKER: &str = ".tmp-";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Backup naming scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFormat {
    /// Name by UTC timestamp.
    #[default]
    Timestamped,
    /// Name by per-basename sequence number.
    Numbered,
    /// Name by content hash prefix.
    #[serde(alias = "content-hash", alias = "content_hash")]
    GitStyle,
}

impl FromStr for BackupFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamped" => Ok(Self::Timestamped),
            "numbered" => Ok(Self::Numbered),
            "git_style" | "git-style" | "content-hash" | "content_hash" => Ok(Self::GitStyle),
            _ => Err(ValidationError::UnknownBackupFormat(s.to_string())),
        }
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timestamped => "timestamped",
            Self::Numbered => "numbered",
            Self::GitStyle => "git_style",
        })
    }
}

/// The data a backup name is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameVariant {
    /// Creation time; `collision` disambiguates backups within the same
    /// millisecond.
    Timestamped {
        /// Creation time.
        at: DateTime<Utc>,
        /// Collision counter (`0` = none).
        collision: u32,
    },
    /// Sequence number (1-based).
    Numbered(u32),
    /// Full hex checksum; only the short prefix appears in the name.
    /// `collision` separates identical content that may not be shared.
    ContentHash {
        /// Full hex checksum.
        checksum: String,
        /// Collision counter (`0` = none).
        collision: u32,
    },
}

impl NameVariant {
    /// Format this variant belongs to.
    #[must_use]
    pub const fn format(&self) -> BackupFormat {
        match self {
            Self::Timestamped { .. } => BackupFormat::Timestamped,
            Self::Numbered(_) => BackupFormat::Numbered,
            Self::ContentHash { .. } => BackupFormat::GitStyle,
        }
    }

    /// The variant-specific name suffix.
    #[must_use]
    pub fn suffix(&self) -> String {
        match self {
            Self::Timestamped { at, collision: 0 } => at.format(TIMESTAMP_FORMAT).to_string(),
            Self::Timestamped { at, collision } => {
                format!("{}-{collision}", at.format(TIMESTAMP_FORMAT))
            }
            Self::Numbered(n) => format!("{n:03}"),
            Self::ContentHash {
                checksum,
                collision: 0,
            } => short_hash(checksum).to_string(),
            Self::ContentHash {
                checksum,
                collision,
            } => format!("{}-{collision}", short_hash(checksum)),
        }
    }
}

/// Build the artifact file name for `original`.
#[must_use]
pub fn backup_file_name(original: &Path, variant: &NameVariant, compressed: bool) -> String {
    let mut name = format!("{}{BACKUP_MARKER}{}", basename(original), variant.suffix());
    if compressed {
        name.push_str(COMPRESSED_EXT);
    }
    name
}

/// Path of the metadata sidecar for `artifact`.
#[must_use]
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut os = artifact.as_os_str().to_owned();
    os.push(SIDECAR_EXT);
    PathBuf::from(os)
}

/// The file-name component of `path` as a string.
#[must_use]
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether `file_name` is an artifact (not a sidecar or temp file) of a
/// file called `basename`.
#[must_use]
pub fn is_artifact_of(file_name: &str, basename: &str) -> bool {
    file_name
        .strip_prefix(basename)
        .and_then(|rest| rest.strip_prefix(BACKUP_MARKER))
        .is_some_and(|suffix| {
            !suffix.is_empty() && !suffix.ends_with(SIDECAR_EXT) && !suffix.contains(TEMP_MARKER)
        })
}

/// Extract the sequence number from a numbered artifact name.
#[must_use]
pub fn parse_sequence(file_name: &str, basename: &str) -> Option<u32> {
    let suffix = file_name
        .strip_prefix(basename)?
        .strip_prefix(BACKUP_MARKER)?;
    let digits = suffix.strip_suffix(COMPRESSED_EXT).unwrap_or(suffix);
    if digits.len() < 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Every artifact in `dir` belonging to a file called `basename`.
///
/// # Errors
///
/// Returns an error if `dir` exists but cannot be read.
pub fn existing_artifacts(dir: &Path, basename: &str) -> SafetyResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_artifact_of(&name, basename) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Next numbered sequence for `basename` in `dir`: one past the highest
/// existing sequence (so `1` for the first backup).
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
pub fn next_sequence(dir: &Path, basename: &str) -> SafetyResult<u32> {
    let highest = existing_artifacts(dir, basename)?
        .iter()
        .filter_map(|p| p.file_name())
        .filter_map(|n| parse_sequence(&n.to_string_lossy(), basename))
        .max()
        .unwrap_or(0);
    Ok(highest.saturating_add(1))
}

/// A collision-checked artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedName {
    /// Absolute artifact path inside the backup directory.
    pub path: PathBuf,
    /// Variant the name was derived from.
    pub variant: NameVariant,
    /// `true` only for `git_style` names whose artifact already exists, i.e.
    /// identical content is already stored.
    pub already_exists: bool,
}

/// Pick an unused artifact name for `original` in `dir`.
///
/// Collisions advance the sequence (`numbered`) or add a counter to the
/// stamp (`timestamped`).  A `git_style` collision reports the existing
/// artifact when `reusable` accepts it, and adds a counter to the hash
/// otherwise.
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
pub fn plan_name(
    dir: &Path,
    original: &Path,
    format: BackupFormat,
    checksum: &str,
    now: DateTime<Utc>,
    compressed: bool,
    reusable: impl Fn(&Path) -> bool,
) -> SafetyResult<PlannedName> {
    let path_for = |variant: &NameVariant| dir.join(backup_file_name(original, variant, compressed));
    let taken = |path: &Path| path.symlink_metadata().is_ok();

    let mut variant = match format {
        BackupFormat::Timestamped => NameVariant::Timestamped {
            at: now,
            collision: 0,
        },
        BackupFormat::Numbered => NameVariant::Numbered(next_sequence(dir, &basename(original))?),
        BackupFormat::GitStyle => {
            let mut variant = NameVariant::ContentHash {
                checksum: checksum.to_string(),
                collision: 0,
            };
            let mut path = path_for(&variant);
            while taken(&path) {
                if reusable(&path) {
                    return Ok(PlannedName {
                        path,
                        variant,
                        already_exists: true,
                    });
                }
                if let NameVariant::ContentHash { collision, .. } = &mut variant {
                    *collision += 1;
                }
                path = path_for(&variant);
            }
            return Ok(PlannedName {
                path,
                variant,
                already_exists: false,
            });
        }
    };

    let mut path = path_for(&variant);
    while taken(&path) {
        variant = match variant {
            NameVariant::Timestamped { at, collision } => NameVariant::Timestamped {
                at,
                collision: collision + 1,
            },
            NameVariant::Numbered(n) => NameVariant::Numbered(n + 1),
            other @ NameVariant::ContentHash { .. } => other,
        };
        path = path_for(&variant);
    }
    Ok(PlannedName {
        path,
        variant,
        already_exists: false,
    })
}
