//! File-safety engine for dotfile deployment.
//!
//! Deploys files from a dotfiles tree into their targets without losing
//! what was there before: every conflicting target is preserved as a
//! versioned, checksummed backup, permissions are resolved from glob
//! rules, and conflicts follow a per-file strategy.
//!
//! The public API is organised into layers:
//!
//! - **[`safety`]**: backup engine, index, conflict resolver, permission
//!   resolver and the [`FileOperationOrchestrator`](safety::orchestrator::FileOperationOrchestrator)
//! - **[`resources`]**: idempotent `check + apply` primitives (copy, symlink, template, chmod)
//! - **[`config`]**: the `dotsafe.toml` manifest and backup policy
//! - **[`commands`]**: top-level subcommands (`apply`, `backup`, `list`, `prune`, `restore`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod resources;
pub mod safety;

/// Version string: `DOTSAFE_VERSION` at build time, else the crate version.
pub const VERSION: &str = match option_env!("DOTSAFE_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
