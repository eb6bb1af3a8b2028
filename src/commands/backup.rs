//! Command: back up a single file.
use anyhow::Result;

use crate::cli::{BackupOpts, GlobalOpts};
use crate::logging::{EntryStatus, Logger};
use crate::safety::engine::{BackupStatus, create_enhanced_backup};

/// Run the backup command.
///
/// The backup policy comes from the manifest entry deploying this path, or
/// the manifest defaults; `--directory` overrides only the location.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or the artifact cannot be
/// written.
pub fn run(global: &GlobalOpts, opts: &BackupOpts, log: &Logger) -> Result<()> {
    let manifest = super::load_manifest_or_default(global, log)?;
    let target = super::resolve_arg(&opts.path)?;
    let mut config = manifest.backup_for(&target).clone();
    if let Some(dir) = &opts.directory {
        config.directory = super::resolve_arg(dir)?;
        config.enabled = true;
    }
    let name = target.display().to_string();

    log.stage(&format!("Backing up {name}"));
    if global.dry_run {
        log.dry_run(&format!(
            "would back up {name} into {}",
            config.directory.display()
        ));
        log.record(&name, EntryStatus::DryRun, None);
        return super::finish(log);
    }

    let outcome = create_enhanced_backup(&target, &config)?;
    for warning in &outcome.warnings {
        log.warn(&warning.to_string());
    }
    let detail = outcome
        .backup_path
        .as_ref()
        .map(|p| p.display().to_string());
    match outcome.status {
        BackupStatus::Created => {
            log.info(&format!("created {}", detail.as_deref().unwrap_or_default()));
            log.record(&name, EntryStatus::Changed, detail.as_deref());
        }
        BackupStatus::Unchanged | BackupStatus::Deduplicated => {
            log.info(&format!(
                "{}: matches {}",
                outcome.status,
                detail.as_deref().unwrap_or_default()
            ));
            log.record(&name, EntryStatus::Unchanged, detail.as_deref());
        }
        BackupStatus::Disabled => {
            log.info("backups are disabled for this target");
            log.record(&name, EntryStatus::Skipped, Some("backups disabled"));
        }
    }
    super::finish(log)
}
