//! High-level file operations with backup, conflict and permission handling.
//!
//! Every operation follows the same sequence under one concurrency permit:
//! expand paths, check the resource state, arbitrate a conflict if the
//! target holds something else, perform the mutation, then enforce
//! permissions.  Failures of the mutation itself are errors; failures of
//! the safety net are collected as warnings on the [`OperationOutcome`].
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;

use super::conflict::{ConflictResolver, ConflictStrategy};
use super::guard::ConcurrencyGuard;
use super::permissions::PermissionConfig;
use crate::config::backup::EnhancedBackupConfig;
use crate::error::Warning;
use crate::platform::expand_path;
use crate::resources::chmod::PermissionResource;
use crate::resources::copy::CopyResource;
use crate::resources::symlink::SymlinkResource;
use crate::resources::template::{TemplateRenderer, TemplateResource, TemplateVars};
use crate::resources::{Applicable as _, Resource, ResourceChange, ResourceState};

/// Result of one orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Absolute target path.
    pub target: PathBuf,
    /// What happened to the target.  In a dry run, `Applied` means the
    /// change would have been made.
    pub change: ResourceChange,
    /// Artifact preserving the previous content, if one was taken.
    pub backup_path: Option<PathBuf>,
    /// Non-fatal safety-net failures.
    pub warnings: Vec<Warning>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl OperationOutcome {
    const fn new(target: PathBuf, dry_run: bool) -> Self {
        Self {
            target,
            change: ResourceChange::AlreadyCorrect,
            backup_path: None,
            warnings: Vec::new(),
            dry_run,
        }
    }
}

/// Façade over resources, the conflict resolver and the permission resolver.
#[derive(Debug, Clone)]
pub struct FileOperationOrchestrator<'a> {
    guard: &'a ConcurrencyGuard,
    backup: &'a EnhancedBackupConfig,
    base: PathBuf,
    dry_run: bool,
}

impl<'a> FileOperationOrchestrator<'a> {
    /// An orchestrator resolving relative paths against `base`.
    #[must_use]
    pub fn new(
        guard: &'a ConcurrencyGuard,
        backup: &'a EnhancedBackupConfig,
        base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            guard,
            backup,
            base: base.into(),
            dry_run: false,
        }
    }

    /// Report what would change without touching the filesystem.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Copy `source` to `target`, preserving conflicting content according
    /// to `strategy`, then apply `permissions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state check, the copy, or the permission
    /// change fails.
    pub fn copy_with_backup(
        &self,
        source: &Path,
        target: &Path,
        strategy: ConflictStrategy,
        permissions: Option<&PermissionConfig>,
    ) -> Result<OperationOutcome> {
        let _permit = self.guard.acquire();
        let resource = CopyResource::new(self.expand(source), self.expand(target));
        let mut outcome = self.deploy(&resource, &resource.target, Some(strategy))?;
        if let Some(permissions) = permissions {
            self.enforce_permissions(&mut outcome, permissions)?;
        }
        Ok(outcome)
    }

    /// Link `target` to `source`, preserving conflicting content according
    /// to `strategy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state check or link creation fails.
    pub fn symlink_with_backup(
        &self,
        source: &Path,
        target: &Path,
        strategy: ConflictStrategy,
    ) -> Result<OperationOutcome> {
        let _permit = self.guard.acquire();
        let resource = SymlinkResource::new(self.expand(source), self.expand(target));
        self.deploy(&resource, &resource.target, Some(strategy))
    }

    /// Apply `permissions` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if modes cannot be read or set.
    pub fn apply_permissions(
        &self,
        target: &Path,
        permissions: &PermissionConfig,
    ) -> Result<OperationOutcome> {
        let _permit = self.guard.acquire();
        let resource = PermissionResource::new(self.expand(target), permissions.clone());
        self.deploy(&resource, &resource.target, None)
    }

    /// Render `source` with `renderer` into `target`, preserving conflicting
    /// content according to `strategy`, then apply `permissions`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering, writing, or the permission change
    /// fails.
    pub fn process_template(
        &self,
        source: &Path,
        target: &Path,
        vars: &TemplateVars,
        renderer: Arc<dyn TemplateRenderer>,
        strategy: ConflictStrategy,
        permissions: Option<&PermissionConfig>,
    ) -> Result<OperationOutcome> {
        let _permit = self.guard.acquire();
        let resource = TemplateResource::new(
            self.expand(source),
            self.expand(target),
            vars.clone(),
            renderer,
        );
        let mut outcome = self.deploy(&resource, &resource.target, Some(strategy))?;
        if let Some(permissions) = permissions {
            self.enforce_permissions(&mut outcome, permissions)?;
        }
        Ok(outcome)
    }

    fn expand(&self, path: &Path) -> PathBuf {
        expand_path(&path.to_string_lossy(), &self.base)
    }

    fn deploy<R: Resource>(
        &self,
        resource: &R,
        target: &Path,
        strategy: Option<ConflictStrategy>,
    ) -> Result<OperationOutcome> {
        let desc = resource.description();
        let mut outcome = OperationOutcome::new(target.to_path_buf(), self.dry_run);
        let state = resource.current_state()?;
        debug!(resource = %desc, ?state, "checked");

        match state {
            ResourceState::Correct => {}
            ResourceState::Invalid { reason } => {
                debug!(resource = %desc, %reason, "skipping");
                outcome.change = ResourceChange::Skipped { reason };
            }
            ResourceState::Missing => self.mutate(resource, &mut outcome)?,
            ResourceState::Incorrect { current } => {
                if let Some(strategy) = strategy
                    && !self.dry_run
                {
                    let resolution = ConflictResolver::new(self.backup).resolve(target, strategy);
                    outcome.warnings.extend(resolution.warnings);
                    outcome.backup_path = resolution.backup_path;
                    if !resolution.should_proceed {
                        outcome.change = ResourceChange::Skipped {
                            reason: format!("conflict left unresolved by '{strategy}' ({current})"),
                        };
                        return Ok(outcome);
                    }
                }
                self.mutate(resource, &mut outcome)?;
            }
        }
        Ok(outcome)
    }

    fn mutate<R: Resource>(&self, resource: &R, outcome: &mut OperationOutcome) -> Result<()> {
        if self.dry_run {
            debug!(resource = %resource.description(), "would apply");
            outcome.change = ResourceChange::Applied;
            return Ok(());
        }
        outcome.change = resource
            .apply()
            .with_context(|| format!("apply {}", resource.description()))?;
        Ok(())
    }

    fn enforce_permissions(
        &self,
        outcome: &mut OperationOutcome,
        permissions: &PermissionConfig,
    ) -> Result<()> {
        if matches!(outcome.change, ResourceChange::Skipped { .. }) {
            return Ok(());
        }
        let resource = PermissionResource::new(outcome.target.clone(), permissions.clone());
        if !resource.needs_change()? {
            return Ok(());
        }
        if !self.dry_run {
            resource
                .apply()
                .with_context(|| format!("apply {}", resource.description()))?;
        }
        outcome.change = ResourceChange::Applied;
        Ok(())
    }
}
