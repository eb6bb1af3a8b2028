// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed file tree and a fluent builder so
// each integration test can lay out a dotfiles repo, a home directory and a
// backup directory without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dotsafe::cli::GlobalOpts;
use dotsafe::config::backup::EnhancedBackupConfig;
use dotsafe::logging::Logger;

/// Relative location of the manifest inside a [`TestTree`].
pub const MANIFEST: &str = "repo/dotsafe.toml";

/// An isolated file tree backed by a [`tempfile::TempDir`].
///
/// Layout conventions: `repo/` holds sources and the manifest, `home/`
/// holds deployment targets, `backups/` receives artifacts.
pub struct TestTree {
    /// Temporary root; deleted on drop.
    pub root: tempfile::TempDir,
}

impl TestTree {
    /// Absolute path of `rel` inside the tree.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Read `rel` as UTF-8.
    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).expect("read file")
    }

    /// Overwrite `rel` with `content`, creating parents.
    pub fn write(&self, rel: &str, content: &str) {
        write_file(&self.path(rel), content);
    }

    /// A default backup policy storing into `backups/`.
    pub fn backup_config(&self) -> EnhancedBackupConfig {
        EnhancedBackupConfig::new(self.path("backups"))
    }

    /// Global options pointing at the tree's manifest.
    pub fn global(&self, dry_run: bool) -> GlobalOpts {
        GlobalOpts {
            manifest: Some(self.path(MANIFEST)),
            dry_run,
            parallel: true,
            max_concurrent: None,
        }
    }

    /// Number of files directly inside `rel` (0 if it does not exist).
    pub fn count_files(&self, rel: &str) -> usize {
        std::fs::read_dir(self.path(rel)).map_or(0, |entries| entries.count())
    }
}

/// A logger with no log file and no subscriber, for collecting records.
pub fn quiet_logger() -> Logger {
    Logger::with_log_file(None)
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write file");
}

/// Fluent builder for [`TestTree`].
pub struct TestTreeBuilder {
    tree: TestTree,
}

impl TestTreeBuilder {
    /// Begin building an empty tree with `repo/` and `home/` directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("repo")).expect("create repo dir");
        std::fs::create_dir_all(root.path().join("home")).expect("create home dir");
        Self {
            tree: TestTree { root },
        }
    }

    /// Write a source file under `repo/`.
    pub fn with_source(self, rel: &str, content: &str) -> Self {
        self.tree.write(&format!("repo/{rel}"), content);
        self
    }

    /// Write a pre-existing target under `home/`.
    pub fn with_existing(self, rel: &str, content: &str) -> Self {
        self.tree.write(&format!("home/{rel}"), content);
        self
    }

    /// Write the manifest.  Paths inside are relative to `repo/`, so
    /// targets are usually written as `../home/<name>`.
    pub fn with_manifest(self, content: &str) -> Self {
        self.tree.write(MANIFEST, content);
        self
    }

    /// Finish building and return the tree.
    pub fn build(self) -> TestTree {
        self.tree
    }
}
