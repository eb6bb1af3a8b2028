//! Structured logger with dry-run awareness and summary collection.
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{EntryRecord, EntryStatus};
use super::utils::log_file_path;

/// Command-level logger.
///
/// Safe to share across the rayon pool: records are collected behind a
/// mutex and console output goes through the global tracing subscriber.
/// Every message also lands in `$XDG_CACHE_HOME/dotsafe/<command>.log`
/// through the file layer installed by
/// [`init_subscriber`](super::subscriber::init_subscriber).
#[derive(Debug)]
pub struct Logger {
    entries: Mutex<Vec<EntryRecord>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a logger for `command`.  The file itself is opened by the
    /// subscriber; the path is kept for the summary footer.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(command))
    }

    /// Create a logger reporting `log_file` in its summary.
    #[must_use]
    pub const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Path of the persistent log file, if any.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (console only when verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record an entry result for the summary.
    pub fn record(&self, name: &str, status: EntryStatus, message: Option<&str>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EntryRecord {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
    }

    /// All recorded entries, in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<EntryRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entries with `status`.
    #[must_use]
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.status == status)
            .count()
    }

    /// Number of failed entries.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.count(EntryStatus::Failed)
    }

    /// Whether any entry failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Log the summary of all recorded entries.
    pub fn print_summary(&self) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }

        self.stage("Summary");
        for entry in &entries {
            let (icon, color) = entry.status.style();
            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.name));
        }

        let [changed, unchanged, skipped, dry_run, failed] = [
            EntryStatus::Changed,
            EntryStatus::Unchanged,
            EntryStatus::Skipped,
            EntryStatus::DryRun,
            EntryStatus::Failed,
        ]
        .map(|s| self.count(s));
        self.info(&format!(
            "{} entries: \x1b[32m{changed} changed\x1b[0m, \x1b[2m{unchanged} unchanged\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m",
            entries.len()
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    fn contents(log: &Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path")).unwrap()
    }

    #[test]
    fn records_in_order() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record("/home/me/.bashrc", EntryStatus::Changed, None);
        log.record("/home/me/.vimrc", EntryStatus::Skipped, Some("conflict"));
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "/home/me/.bashrc");
        assert_eq!(entries[1].message.as_deref(), Some("conflict"));
    }

    #[test]
    fn failure_count_counts_only_failures() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(!log.has_failures());
        log.record("a", EntryStatus::Changed, None);
        log.record("b", EntryStatus::Failed, Some("boom"));
        log.record("c", EntryStatus::Failed, Some("bang"));
        assert_eq!(log.failure_count(), 2);
        assert!(log.has_failures());
    }

    #[test]
    fn messages_reach_the_file_with_tags() {
        let (log, _tmp, _guard) = isolated_logger();
        log.stage("stage-marker");
        log.warn("warn-marker");
        log.error("error-marker");
        log.dry_run("dry-marker");
        log.debug("debug-marker");
        let text = contents(&log);
        assert!(text.contains("==> stage-marker"));
        assert!(text.contains("[warn] warn-marker"));
        assert!(text.contains("[error] error-marker"));
        assert!(text.contains("[dry run] dry-marker"));
        assert!(text.contains("debug-marker"));
    }

    #[test]
    fn summary_is_written_without_ansi() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record("/t/a", EntryStatus::Changed, Some("backup: /b/a.backup.001"));
        log.record("/t/b", EntryStatus::Unchanged, None);
        log.print_summary();
        let text = contents(&log);
        assert!(text.contains("==> Summary"));
        assert!(text.contains("✓ /t/a (backup: /b/a.backup.001)"));
        assert!(text.contains("2 entries: 1 changed, 1 unchanged, 0 skipped, 0 dry-run, 0 failed"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn empty_summary_writes_nothing() {
        let (log, _tmp, _guard) = isolated_logger();
        log.print_summary();
        assert!(!contents(&log).contains("Summary"));
    }
}
