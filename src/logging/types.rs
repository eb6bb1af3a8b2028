//! Per-entry records collected for the run summary.
use std::fmt;

/// Result of processing one manifest entry or command target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Target path or other label.
    pub name: String,
    /// Final status.
    pub status: EntryStatus,
    /// Optional detail (backup path, skip reason, error).
    pub message: Option<String>,
}

/// Status of a processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// The target was changed.
    Changed,
    /// The target was already correct.
    Unchanged,
    /// The target was left alone.
    Skipped,
    /// Dry run; the target would have changed.
    DryRun,
    /// Processing failed.
    Failed,
}

impl EntryStatus {
    /// Summary icon and ANSI color.
    #[must_use]
    pub const fn style(self) -> (&'static str, &'static str) {
        match self {
            Self::Changed => ("✓", "\x1b[32m"),
            Self::Unchanged => ("·", "\x1b[2m"),
            Self::Skipped => ("○", "\x1b[33m"),
            Self::DryRun => ("~", "\x1b[37m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::DryRun => "dry-run",
            Self::Failed => "failed",
        })
    }
}
