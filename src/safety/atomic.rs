//! Crash-safe file replacement.
//!
//! Content is staged to a sibling temp file (same directory, so the rename
//! never crosses a filesystem), flushed to disk, then renamed over the
//! destination.  A crash leaves either the old file or the new one, plus at
//! worst an orphaned `*.tmp-*` file that readers ignore.
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::naming::TEMP_MARKER;
use crate::error::{IoResultExt as _, SafetyResult};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique temp path next to `path`.
#[must_use]
pub fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut os = path.as_os_str().to_owned();
    os.push(format!("{TEMP_MARKER}{}-{n}", std::process::id()));
    PathBuf::from(os)
}

/// Atomically replace `path` with `bytes`.
///
/// # Errors
///
/// Returns an error naming `path` (or its temp sibling) if any step fails;
/// the temp file is removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> SafetyResult<()> {
    write_atomic_with(path, |file| file.write_all(bytes))
}

/// Atomically replace `path` with whatever `fill` writes into the staged file.
///
/// # Errors
///
/// Returns an error if staging, flushing, or renaming fails.
pub fn write_atomic_with(
    path: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> SafetyResult<()> {
    let tmp = temp_sibling(path);
    let cleanup = || {
        let _ = std::fs::remove_file(&tmp);
    };

    let staged = File::create(&tmp).and_then(|mut file| {
        fill(&mut file)?;
        file.sync_all()
    });
    if let Err(e) = staged {
        cleanup();
        return Err(e).at_path(&tmp);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        cleanup();
        return Err(e).at_path(path);
    }
    Ok(())
}
