//! Command: list backups.
use anyhow::Result;

use crate::cli::{GlobalOpts, ListOpts};
use crate::logging::Logger;
use crate::safety::engine;

/// Run the list command.
///
/// # Errors
///
/// Returns an error if the index is corrupt or the directory unreadable.
pub fn run(_global: &GlobalOpts, opts: &ListOpts, log: &Logger) -> Result<()> {
    let dir = super::resolve_arg(&opts.dir)?;
    let target = opts.target.as_deref().map(super::resolve_arg).transpose()?;

    log.stage(&format!("Backups in {}", dir.display()));
    let records = engine::list(&dir, target.as_deref())?;
    if records.is_empty() {
        log.info("no backups found");
        return Ok(());
    }
    for record in &records {
        log.info(&format!(
            "{}  {}  {} bytes{}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.original_path.display(),
            record.original_size,
            if record.compressed { " (gz)" } else { "" },
            record.backup_path.display(),
        ));
    }
    log.info(&format!("{} backup(s)", records.len()));
    Ok(())
}
