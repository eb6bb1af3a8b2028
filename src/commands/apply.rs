//! Command: deploy every manifest entry.
use std::fmt::Write as _;
use std::ops::AddAssign;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::{DeployMethod, FileEntry};
use crate::logging::{EntryStatus, Logger};
use crate::resources::ResourceChange;
use crate::safety::guard::ConcurrencyGuard;
use crate::safety::orchestrator::{FileOperationOrchestrator, OperationOutcome};

/// Counters for one `apply` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Entries changed (or that would change in a dry run).
    pub changed: u32,
    /// Entries already in the desired state.
    pub already_ok: u32,
    /// Entries left alone.
    pub skipped: u32,
    /// Entries whose operation failed.
    pub failed: u32,
    /// Safety-net warnings raised across all entries.
    pub warnings: u32,
}

impl ApplyStats {
    /// Format the summary line.
    ///
    /// # Examples
    ///
    /// ```
    /// use dotsafe::commands::apply::ApplyStats;
    ///
    /// let stats = ApplyStats { changed: 2, already_ok: 5, ..ApplyStats::default() };
    /// assert_eq!(stats.summary(false), "2 changed, 5 already ok");
    /// assert_eq!(stats.summary(true), "2 would change, 5 already ok");
    /// ```
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        let mut out = format!("{} {verb}, {} already ok", self.changed, self.already_ok);
        for (count, label) in [
            (self.skipped, "skipped"),
            (self.failed, "failed"),
            (self.warnings, "warning(s)"),
        ] {
            if count > 0 {
                let _ = write!(out, ", {count} {label}");
            }
        }
        out
    }
}

impl AddAssign for ApplyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.changed += rhs.changed;
        self.already_ok += rhs.already_ok;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
        self.warnings += rhs.warnings;
    }
}

/// Run the apply command.
///
/// Entries fail independently: a failed entry is logged and recorded, and
/// the command returns an error after all entries have been processed.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or any entry failed.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    log.info(&format!("dotsafe {}", crate::VERSION));

    log.stage("Loading manifest");
    let manifest = super::load_manifest(global, log)?;

    let max = global.max_concurrent.unwrap_or(manifest.max_concurrent);
    let guard = ConcurrencyGuard::global(max);
    log.debug(&format!(
        "max concurrent operations: {}, parallel: {}",
        guard.max(),
        global.parallel
    ));

    log.stage(if global.dry_run {
        "Planning deployment"
    } else {
        "Deploying files"
    });
    let work = |entry: &FileEntry| {
        process_entry(entry, &manifest.root, guard, global.dry_run, log)
    };
    let stats = if global.parallel {
        collect_parallel_stats(&manifest.files, work)?
    } else {
        let mut stats = ApplyStats::default();
        for entry in &manifest.files {
            stats += work(entry);
        }
        stats
    };
    log.info(&stats.summary(global.dry_run));

    super::finish(log)
}

/// Accumulate per-entry [`ApplyStats`] in parallel using Rayon.
fn collect_parallel_stats<'a>(
    entries: &'a [FileEntry],
    work: impl Fn(&'a FileEntry) -> ApplyStats + Sync + Send,
) -> Result<ApplyStats> {
    use rayon::prelude::*;
    let stats = Mutex::new(ApplyStats::default());
    entries.par_iter().try_for_each(|entry| -> Result<()> {
        let delta = work(entry);
        *stats
            .lock()
            .map_err(|e| anyhow::anyhow!("stats mutex poisoned: {e}"))? += delta;
        Ok(())
    })?;
    Ok(stats
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner))
}

/// Deploy one entry and log and record its outcome.
fn process_entry(
    entry: &FileEntry,
    root: &Path,
    guard: &ConcurrencyGuard,
    dry_run: bool,
    log: &Logger,
) -> ApplyStats {
    let name = entry.target.display().to_string();
    match deploy(entry, root, guard, dry_run) {
        Ok(outcome) => report(entry, &outcome, log),
        Err(e) => {
            log.error(&format!("{name}: {e:#}"));
            log.record(&name, EntryStatus::Failed, Some(&format!("{e:#}")));
            ApplyStats {
                failed: 1,
                ..ApplyStats::default()
            }
        }
    }
}

fn deploy(
    entry: &FileEntry,
    root: &Path,
    guard: &ConcurrencyGuard,
    dry_run: bool,
) -> Result<OperationOutcome> {
    let orchestrator = FileOperationOrchestrator::new(guard, &entry.backup, root).dry_run(dry_run);
    let permissions = entry.permissions.as_ref();
    match entry.method {
        DeployMethod::Copy => orchestrator.copy_with_backup(
            &entry.source,
            &entry.target,
            entry.conflict,
            permissions,
        ),
        DeployMethod::Template => orchestrator.process_template(
            &entry.source,
            &entry.target,
            &entry.template.vars,
            entry.template.engine.renderer(),
            entry.conflict,
            permissions,
        ),
        DeployMethod::Symlink => {
            let mut outcome =
                orchestrator.symlink_with_backup(&entry.source, &entry.target, entry.conflict)?;
            // A link has no mode of its own; permissions belong to what it points at.
            if let Some(permissions) = permissions
                && !matches!(outcome.change, ResourceChange::Skipped { .. })
            {
                let source = orchestrator.apply_permissions(&entry.source, permissions)?;
                outcome.warnings.extend(source.warnings);
                if source.change == ResourceChange::Applied {
                    outcome.change = ResourceChange::Applied;
                }
            }
            Ok(outcome)
        }
    }
}

fn report(entry: &FileEntry, outcome: &OperationOutcome, log: &Logger) -> ApplyStats {
    let name = outcome.target.display().to_string();
    let verb = entry.method.verb();
    let mut stats = ApplyStats {
        warnings: u32::try_from(outcome.warnings.len()).unwrap_or(u32::MAX),
        ..ApplyStats::default()
    };
    for warning in &outcome.warnings {
        log.warn(&warning.to_string());
    }

    match &outcome.change {
        ResourceChange::Applied if outcome.dry_run => {
            log.dry_run(&format!("would {verb}: {name}"));
            log.record(&name, EntryStatus::DryRun, None);
            stats.changed = 1;
        }
        ResourceChange::Applied => {
            let backup = outcome
                .backup_path
                .as_ref()
                .map(|p| format!("backup: {}", p.display()));
            log.info(&format!("{verb}: {name}"));
            log.record(&name, EntryStatus::Changed, backup.as_deref());
            stats.changed = 1;
        }
        ResourceChange::AlreadyCorrect => {
            log.debug(&format!("ok: {name}"));
            log.record(&name, EntryStatus::Unchanged, None);
            stats.already_ok = 1;
        }
        ResourceChange::Skipped { reason } => {
            log.info(&format!("skipped {name}: {reason}"));
            log.record(&name, EntryStatus::Skipped, Some(reason));
            stats.skipped = 1;
        }
    }
    stats
}
