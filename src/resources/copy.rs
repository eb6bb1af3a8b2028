//! Copy resource: `target` holds a byte-identical copy of `source`.
use anyhow::{Context as _, Result};
use std::io::Write as _;
use std::path::PathBuf;

use super::helpers::fs::{ensure_parent_dir, is_real_dir, is_symlink, occupied};
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::safety::atomic::write_atomic_with;
use crate::safety::checksum;

/// A regular file at `target` with the same content as `source`.
#[derive(Debug, Clone)]
pub struct CopyResource {
    /// File whose content is deployed.
    pub source: PathBuf,
    /// Destination path.
    pub target: PathBuf,
}

impl CopyResource {
    /// Create a new copy resource.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf) -> Self {
        Self { source, target }
    }
}

impl Applicable for CopyResource {
    fn description(&self) -> String {
        format!("{} <= {}", self.target.display(), self.source.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let bytes = std::fs::read(&self.source)
            .with_context(|| format!("read source: {}", self.source.display()))?;
        let permissions = std::fs::metadata(&self.source)
            .with_context(|| format!("stat source: {}", self.source.display()))?
            .permissions();
        ensure_parent_dir(&self.target)?;
        // The rename replaces a symlink at the target rather than writing through it.
        write_atomic_with(&self.target, |file| {
            file.set_permissions(permissions)?;
            file.write_all(&bytes)
        })?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for CopyResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.source.is_file() {
            return Ok(ResourceState::Invalid {
                reason: format!("source is not a file: {}", self.source.display()),
            });
        }
        if is_real_dir(&self.target) {
            return Ok(ResourceState::Invalid {
                reason: "target is a real directory".to_string(),
            });
        }
        if !occupied(&self.target) {
            return Ok(ResourceState::Missing);
        }
        if is_symlink(&self.target) {
            return Ok(ResourceState::Incorrect {
                current: "target is a symlink".to_string(),
            });
        }
        if checksum::digest(&self.source)? == checksum::digest(&self.target)? {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: "content differs".to_string(),
            })
        }
    }
}
