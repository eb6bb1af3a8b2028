//! Top-level subcommand orchestration.
pub mod apply;
pub mod backup;
pub mod list;
pub mod prune;
pub mod restore;
pub mod version;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use crate::cli::GlobalOpts;
use crate::config::Manifest;
use crate::config::manifest::{MANIFEST_ENV, locate_from_env};
use crate::logging::Logger;
use crate::platform::expand_path;

/// Load the manifest named by `--manifest`, `$DOTSAFE_MANIFEST`, or
/// `./dotsafe.toml`.
///
/// # Errors
///
/// Returns an error if the manifest is missing or invalid.
pub fn load_manifest(global: &GlobalOpts, log: &Logger) -> Result<Manifest> {
    let path = locate_from_env(global.manifest.as_deref())?;
    log.debug(&format!("manifest: {}", path.display()));
    let manifest = Manifest::load(&path)?;
    log.info(&format!(
        "loaded {} file entr{} from {}",
        manifest.files.len(),
        if manifest.files.len() == 1 { "y" } else { "ies" },
        path.display()
    ));
    Ok(manifest)
}

/// Like [`load_manifest`], but an unnamed manifest that does not exist
/// yields built-in defaults rooted at the working directory.
///
/// # Errors
///
/// Returns an error if a named manifest is missing, or any manifest found
/// is invalid.
pub fn load_manifest_or_default(global: &GlobalOpts, log: &Logger) -> Result<Manifest> {
    let named = global.manifest.is_some() || std::env::var_os(MANIFEST_ENV).is_some();
    let path = locate_from_env(global.manifest.as_deref())?;
    if named || path.is_file() {
        return load_manifest(global, log);
    }
    log.debug("no manifest found; using default backup policy");
    Manifest::empty(&current_dir()?)
}

/// Resolve a path argument (`~` and relative paths) against the working
/// directory.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined.
pub fn resolve_arg(path: &Path) -> Result<PathBuf> {
    Ok(expand_path(&path.to_string_lossy(), &current_dir()?))
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("determine working directory")
}

/// Print the summary and bail if any entry failed.
///
/// # Errors
///
/// Returns an error if one or more entries recorded a failure.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();
    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} entr{} failed", if count == 1 { "y" } else { "ies" });
    }
    Ok(())
}
