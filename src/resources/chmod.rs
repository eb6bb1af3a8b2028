//! Permission resource: applies resolved modes to a file or tree.
use anyhow::Result;
use std::path::PathBuf;

use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::safety::permissions::{self, PermissionConfig, format_mode};

/// Permission modes on a file or tree, resolved from a [`PermissionConfig`].
#[derive(Debug, Clone)]
pub struct PermissionResource {
    /// Target file or directory (absolute).
    pub target: PathBuf,
    /// Modes and rules to apply.
    pub config: PermissionConfig,
}

impl PermissionResource {
    /// Create a new permission resource.
    #[must_use]
    pub const fn new(target: PathBuf, config: PermissionConfig) -> Self {
        Self { target, config }
    }
}

impl Applicable for PermissionResource {
    fn description(&self) -> String {
        let scope = if self.config.recursive { " (recursive)" } else { "" };
        format!(
            "{}/{} {}{scope}",
            self.config.file_mode,
            self.config.directory_mode,
            self.target.display()
        )
    }

    fn apply(&self) -> Result<ResourceChange> {
        if cfg!(not(unix)) {
            return Ok(ResourceChange::Skipped {
                reason: "permissions not supported on this platform".to_string(),
            });
        }
        permissions::apply_rules(&self.target, &self.config)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for PermissionResource {
    fn current_state(&self) -> Result<ResourceState> {
        if self.target.symlink_metadata().is_err() {
            return Ok(ResourceState::Invalid {
                reason: format!("target does not exist: {}", self.target.display()),
            });
        }
        if cfg!(not(unix)) {
            return Ok(ResourceState::Invalid {
                reason: "permissions not supported on this platform".to_string(),
            });
        }
        let pending = permissions::pending_modes(&self.target, &self.config)?;
        match pending.as_slice() {
            [] => Ok(ResourceState::Correct),
            [only] => Ok(ResourceState::Incorrect {
                current: format!("{} wants {}", only.path.display(), format_mode(only.mode)),
            }),
            many => Ok(ResourceState::Incorrect {
                current: format!("{} entries differ", many.len()),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::safety::permissions::PermissionRules;

    #[test]
    fn description_names_modes_and_target() {
        let resource = PermissionResource::new(
            PathBuf::from("/home/user/.ssh"),
            PermissionConfig::new("0600", "0700", true, PermissionRules::default()).unwrap(),
        );
        let d = resource.description();
        assert!(d.contains("0600/0700"));
        assert!(d.contains(".ssh"));
        assert!(d.contains("recursive"));
    }

    #[test]
    fn invalid_when_target_missing() {
        let dir = tempfile::tempdir().unwrap();
        let resource =
            PermissionResource::new(dir.path().join("nope"), PermissionConfig::default());
        assert!(matches!(
            resource.current_state().unwrap(),
            ResourceState::Invalid { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn apply_then_correct() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("id_ed25519");
        std::fs::write(&file, "k").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let rules = PermissionRules::new([("id_*", "0600")]).unwrap();
        let config = PermissionConfig::new("0644", "0755", false, rules).unwrap();
        let resource = PermissionResource::new(file.clone(), config);

        assert!(resource.needs_change().unwrap());
        assert_eq!(resource.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
        let mode = std::fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
