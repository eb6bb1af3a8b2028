//! Host path and file-metadata helpers.
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::error::{IoResultExt as _, SafetyResult};

/// The current user's home directory (`$HOME`, then `%USERPROFILE%`).
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Expand `raw` to an absolute path.
///
/// `~` and `~/…` expand against the home directory; other relative paths
/// are joined onto `base`.  `.` and `..` components are folded lexically,
/// without touching the filesystem.
#[must_use]
pub fn expand_path(raw: &str, base: &Path) -> PathBuf {
    let joined = if raw == "~" {
        home_dir().unwrap_or_else(|| base.to_path_buf())
    } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        home_dir().unwrap_or_else(|| base.to_path_buf()).join(rest)
    } else {
        let p = Path::new(raw);
        if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
    };
    dunce::simplified(&normalize(&joined)).to_path_buf()
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Metadata of one filesystem entry, read without following symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Permission bits (`0` on platforms without Unix modes).
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry is a symlink.
    pub is_symlink: bool,
}

/// Read [`FileInfo`] for `path`.
///
/// # Errors
///
/// Returns an error naming `path` if it cannot be stat'ed.
pub fn file_info(path: &Path) -> SafetyResult<FileInfo> {
    let meta = path.symlink_metadata().at_path(path)?;
    Ok(FileInfo {
        mode: mode_of(&meta),
        size: meta.len(),
        modified: meta.modified().ok(),
        is_dir: meta.is_dir(),
        is_symlink: meta.file_type().is_symlink(),
    })
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
const fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0
}
