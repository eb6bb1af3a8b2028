//! Command: prune old backups of one target.
use anyhow::Result;

use crate::cli::{GlobalOpts, PruneOpts};
use crate::logging::{EntryStatus, Logger};
use crate::safety::engine;

/// Run the prune command.
///
/// # Errors
///
/// Returns an error if the index is corrupt or cannot be rewritten.
pub fn run(global: &GlobalOpts, opts: &PruneOpts, log: &Logger) -> Result<()> {
    let dir = super::resolve_arg(&opts.dir)?;
    let target = super::resolve_arg(&opts.target)?;
    let name = target.display().to_string();

    log.stage(&format!("Pruning backups of {name} (keeping {})", opts.keep));
    if global.dry_run {
        let mut records = engine::list(&dir, Some(&target))?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let doomed = records.iter().skip(opts.keep).count();
        for record in records.iter().skip(opts.keep) {
            log.dry_run(&format!("would remove {}", record.backup_path.display()));
        }
        log.record(&name, EntryStatus::DryRun, Some(&format!("{doomed} to remove")));
        return super::finish(log);
    }

    let outcome = engine::prune(&dir, &target, opts.keep)?;
    for warning in &outcome.warnings {
        log.warn(&warning.to_string());
    }
    for removed in &outcome.removed {
        log.info(&format!("removed {}", removed.display()));
    }
    let status = if outcome.removed.is_empty() {
        EntryStatus::Unchanged
    } else {
        EntryStatus::Changed
    };
    log.record(
        &name,
        status,
        Some(&format!("{} removed", outcome.removed.len())),
    );
    super::finish(log)
}
