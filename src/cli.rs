//! Command-line surface: subcommands and their options.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the dotsafe engine.
#[derive(Parser, Debug)]
#[command(
    name = "dotsafe",
    about = "Safe dotfile deployment: versioned backups, conflict handling, permissions",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Manifest path (default: $DOTSAFE_MANIFEST, then ./dotsafe.toml)
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Process entries one at a time (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,

    /// Upper bound on concurrently running file operations
    #[arg(long, global = true)]
    pub max_concurrent: Option<usize>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy every file listed in the manifest
    Apply,
    /// Back up a single file
    Backup(BackupOpts),
    /// List backups in a directory
    List(ListOpts),
    /// Remove all but the newest backups of a target
    Prune(PruneOpts),
    /// Restore a backup artifact
    Restore(RestoreOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Backup(_) => "backup",
            Self::List(_) => "list",
            Self::Prune(_) => "prune",
            Self::Restore(_) => "restore",
            Self::Version => "version",
        }
    }
}

/// Options for the `backup` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct BackupOpts {
    /// File to back up
    pub path: PathBuf,

    /// Backup directory (default: from the manifest)
    #[arg(long)]
    pub directory: Option<PathBuf>,
}

/// Options for the `list` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ListOpts {
    /// Backup directory
    pub dir: PathBuf,

    /// Only list backups of this original path
    #[arg(long)]
    pub target: Option<PathBuf>,
}

/// Options for the `prune` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct PruneOpts {
    /// Backup directory
    pub dir: PathBuf,

    /// Original path whose backups are pruned
    #[arg(long)]
    pub target: PathBuf,

    /// Number of newest backups to keep
    #[arg(long)]
    pub keep: usize,
}

/// Options for the `restore` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RestoreOpts {
    /// Backup artifact to restore
    pub artifact: PathBuf,

    /// Destination (default: the original path recorded with the backup)
    #[arg(long = "to")]
    pub to: Option<PathBuf>,
}
