//! Command: restore a backup artifact.
use anyhow::Result;

use crate::cli::{GlobalOpts, RestoreOpts};
use crate::logging::{EntryStatus, Logger};
use crate::safety::engine;

/// Run the restore command.
///
/// # Errors
///
/// Returns an error if the artifact is unreadable, fails checksum
/// verification, has no known destination, or cannot be written.
pub fn run(global: &GlobalOpts, opts: &RestoreOpts, log: &Logger) -> Result<()> {
    let artifact = super::resolve_arg(&opts.artifact)?;
    let to = opts.to.as_deref().map(super::resolve_arg).transpose()?;
    let name = artifact.display().to_string();

    log.stage(&format!("Restoring {name}"));
    if global.dry_run {
        let dest = to.as_ref().map_or_else(
            || "its original path".to_string(),
            |p| p.display().to_string(),
        );
        log.dry_run(&format!("would restore {name} to {dest}"));
        log.record(&name, EntryStatus::DryRun, None);
        return super::finish(log);
    }

    let written = engine::restore(&artifact, to.as_deref())?;
    log.info(&format!("restored to {}", written.display()));
    log.record(
        &name,
        EntryStatus::Changed,
        Some(&written.display().to_string()),
    );
    super::finish(log)
}
