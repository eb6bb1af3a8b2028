//! The `dotsafe.toml` deployment manifest.
//!
//! The manifest lists the files to deploy and the safety policy around each
//! one.  It is parsed into `Raw*` structs that mirror the TOML exactly, then
//! validated into [`Manifest`] where every path is absolute and every
//! identifier has been checked.
use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use super::backup::{EnhancedBackupConfig, RawBackupConfig};
use super::toml_loader;
use crate::error::ValidationError;
use crate::platform::expand_path;
use crate::resources::template::{TemplateEngine, TemplateVars};
use crate::safety::conflict::ConflictStrategy;
use crate::safety::guard::DEFAULT_MAX_CONCURRENT;
use crate::safety::permissions::{
    DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE, PermissionConfig, PermissionRules,
};

/// File name looked up in the working directory when no path is given.
pub const MANIFEST_FILE_NAME: &str = "dotsafe.toml";

/// Environment variable naming the manifest when `--manifest` is absent.
pub const MANIFEST_ENV: &str = "DOTSAFE_MANIFEST";

/// How a file is deployed to its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum DeployMethod {
    /// Target becomes a symlink to the source.
    #[default]
    Symlink,
    /// Target becomes a byte copy of the source.
    Copy,
    /// Target is rendered from the source template.
    Template,
}

impl DeployMethod {
    /// Verb used in log lines.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Symlink => "link",
            Self::Copy => "copy",
            Self::Template => "render",
        }
    }
}

impl FromStr for DeployMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symlink" | "link" => Ok(Self::Symlink),
            "copy" => Ok(Self::Copy),
            "template" => Ok(Self::Template),
            _ => Err(ValidationError::UnknownMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeployMethod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DeployMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Symlink => "symlink",
            Self::Copy => "copy",
            Self::Template => "template",
        })
    }
}

/// Template settings for a `template` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Rendering engine.
    pub engine: TemplateEngine,
    /// Variables passed to the engine.
    pub vars: TemplateVars,
}

/// One validated `[[files]]` entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute source path inside the dotfiles tree.
    pub source: PathBuf,
    /// Absolute deployment target.
    pub target: PathBuf,
    /// Deployment method.
    pub method: DeployMethod,
    /// Conflict strategy, after applying the manifest default.
    pub conflict: ConflictStrategy,
    /// Permissions to enforce after deployment.
    pub permissions: Option<PermissionConfig>,
    /// Template settings; only meaningful for [`DeployMethod::Template`].
    pub template: TemplateSpec,
    /// Backup policy, after overlaying the entry's table on the defaults.
    pub backup: EnhancedBackupConfig,
}

/// A validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Absolute path of the manifest file.
    pub path: PathBuf,
    /// Directory relative paths are resolved against.
    pub root: PathBuf,
    /// Upper bound on concurrently running file operations.
    pub max_concurrent: usize,
    /// Conflict strategy for entries without their own.
    pub default_conflict: ConflictStrategy,
    /// Backup policy for entries without their own table.
    pub default_backup: EnhancedBackupConfig,
    /// Files to deploy, in manifest order.
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    max_concurrent: Option<usize>,
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default)]
    files: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefaults {
    conflict: Option<ConflictStrategy>,
    #[serde(default)]
    backup: RawBackupConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    source: Option<String>,
    target: Option<String>,
    method: Option<DeployMethod>,
    conflict: Option<ConflictStrategy>,
    permissions: Option<RawPermissions>,
    template: Option<RawTemplate>,
    backup: Option<RawBackupConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPermissions {
    file_mode: Option<String>,
    directory_mode: Option<String>,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    rules: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    engine: Option<TemplateEngine>,
    #[serde(default)]
    vars: TemplateVars,
}

/// Pick the manifest path: explicit argument, then `env_value`, then
/// `dotsafe.toml` in `cwd`.  Relative results are anchored at `cwd`.
#[must_use]
pub fn locate(explicit: Option<&Path>, env_value: Option<OsString>, cwd: &Path) -> PathBuf {
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_value.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE_NAME));
    expand_path(&chosen.to_string_lossy(), cwd)
}

/// [`locate`] using the process environment and working directory.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined.
pub fn locate_from_env(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("determine working directory")?;
    Ok(locate(explicit, std::env::var_os(MANIFEST_ENV), &cwd))
}

impl Manifest {
    /// Load and validate the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, is not valid TOML, or fails
    /// validation.  Validation errors name the offending entry.
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawManifest = toml_loader::load(path)?;
        Self::resolve(raw, path)
    }

    /// Parse and validate manifest `content` as if it were stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not valid TOML or fails validation.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest = toml_loader::parse(content, path)?;
        Self::resolve(raw, path)
    }

    /// A manifest with no entries and default policies rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the built-in defaults fail validation.
    pub fn empty(root: &Path) -> Result<Self> {
        Self::resolve(RawManifest::default(), &root.join(MANIFEST_FILE_NAME))
    }

    fn resolve(raw: RawManifest, path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let root = path
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        let default_conflict = raw.defaults.conflict.unwrap_or_default();
        let default_backup = raw
            .defaults
            .backup
            .resolve(&root)
            .context("invalid [defaults.backup]")?;

        let files = raw
            .files
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let label = entry.target.clone().unwrap_or_default();
                resolve_entry(entry, &root, default_conflict, &raw.defaults.backup)
                    .with_context(|| format!("invalid files[{i}] ({label})"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            path,
            root,
            max_concurrent: raw.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
            default_conflict,
            default_backup,
            files,
        })
    }

    /// Backup policy for `target`: the matching entry's, else the default.
    #[must_use]
    pub fn backup_for(&self, target: &Path) -> &EnhancedBackupConfig {
        self.files
            .iter()
            .find(|f| f.target == target)
            .map_or(&self.default_backup, |f| &f.backup)
    }
}

fn resolve_entry(
    entry: RawEntry,
    root: &Path,
    default_conflict: ConflictStrategy,
    default_backup: &RawBackupConfig,
) -> Result<FileEntry, ValidationError> {
    let source = entry
        .source
        .ok_or_else(|| ValidationError::MissingField("source".to_string()))?;
    let target = entry
        .target
        .ok_or_else(|| ValidationError::MissingField("target".to_string()))?;

    let permissions = entry
        .permissions
        .map(|p| {
            PermissionConfig::new(
                p.file_mode.as_deref().unwrap_or(DEFAULT_FILE_MODE),
                p.directory_mode.as_deref().unwrap_or(DEFAULT_DIRECTORY_MODE),
                p.recursive,
                PermissionRules::new(p.rules)?,
            )
        })
        .transpose()?;

    let template = entry
        .template
        .map(|t| TemplateSpec {
            engine: t.engine.unwrap_or_default(),
            vars: t.vars,
        })
        .unwrap_or_default();

    let backup = entry
        .backup
        .unwrap_or_default()
        .or(default_backup)
        .resolve(root)?;

    Ok(FileEntry {
        source: expand_path(&source, root),
        target: expand_path(&target, root),
        method: entry.method.unwrap_or_default(),
        conflict: entry.conflict.unwrap_or(default_conflict),
        permissions,
        template,
        backup,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::safety::naming::BackupFormat;

    const FULL: &str = r#"
max_concurrent = 4

[defaults]
conflict = "backup"

[defaults.backup]
directory = "backups"
format = "numbered"
max_backups = 3

[[files]]
source = "bashrc"
target = "/home/me/.bashrc"

[[files]]
source = "ssh"
target = "/home/me/.ssh"
method = "copy"
conflict = "skip"
backup = { compression = true }

[files.permissions]
file_mode = "0644"
directory_mode = "0700"
recursive = true
rules = { "id_*" = "0600", "*.pub" = "0644" }

[[files]]
source = "gitconfig.tmpl"
target = "/home/me/.gitconfig"
method = "template"

[files.template]
vars = { name = "me" }
"#;

    fn parse(content: &str) -> Result<Manifest> {
        Manifest::parse(content, Path::new("/repo/dotsafe.toml"))
    }

    #[test]
    fn parses_full_manifest() {
        let m = parse(FULL).unwrap();
        assert_eq!(m.max_concurrent, 4);
        assert_eq!(m.root, PathBuf::from("/repo"));
        assert_eq!(m.default_backup.directory, PathBuf::from("/repo/backups"));
        assert_eq!(m.files.len(), 3);

        let bashrc = &m.files[0];
        assert_eq!(bashrc.source, PathBuf::from("/repo/bashrc"));
        assert_eq!(bashrc.method, DeployMethod::Symlink);
        assert_eq!(bashrc.conflict, ConflictStrategy::Backup);
        assert!(bashrc.permissions.is_none());

        let ssh = &m.files[1];
        assert_eq!(ssh.method, DeployMethod::Copy);
        assert_eq!(ssh.conflict, ConflictStrategy::Skip);
        assert!(ssh.backup.compression);
        assert_eq!(ssh.backup.format, BackupFormat::Numbered);
        assert_eq!(ssh.backup.max_backups, 3);
        let perms = ssh.permissions.as_ref().unwrap();
        assert!(perms.recursive);
        assert_eq!(perms.rules.len(), 2);

        let git = &m.files[2];
        assert_eq!(git.method, DeployMethod::Template);
        assert_eq!(git.template.engine, TemplateEngine::Simple);
        assert_eq!(git.template.vars.get("name").map(String::as_str), Some("me"));
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let m = parse("").unwrap();
        assert_eq!(m.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(m.default_conflict, ConflictStrategy::Backup);
        assert!(m.files.is_empty());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = parse("[[files]]\nsource = \"a\"\ntarget = \"b\"\nmethod = \"hardlink\"\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("hardlink"));
    }

    #[test]
    fn unknown_conflict_strategy_is_rejected() {
        let err = parse("[defaults]\nconflict = \"merge\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("merge"));
    }

    #[test]
    fn invalid_mode_names_the_entry() {
        let err = parse(
            "[[files]]\nsource = \"a\"\ntarget = \"/t/a\"\n[files.permissions]\nfile_mode = \"0999\"\n",
        )
        .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("files[0]"), "{msg}");
        assert!(msg.contains("0999"), "{msg}");
    }

    #[test]
    fn missing_target_is_reported() {
        let err = parse("[[files]]\nsource = \"a\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("target"));
    }

    #[test]
    fn negative_max_backups_is_rejected() {
        let err = parse("[defaults.backup]\nmax_backups = -2\n").unwrap_err();
        assert!(format!("{err:#}").contains("-2"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse("max_concurency = 3\n").is_err());
    }

    #[test]
    fn missing_manifest_names_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn backup_for_prefers_entry_policy() {
        let m = parse(FULL).unwrap();
        assert!(m.backup_for(Path::new("/home/me/.ssh")).compression);
        assert!(!m.backup_for(Path::new("/elsewhere")).compression);
    }

    #[test]
    fn locate_prefers_explicit_then_env_then_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(
            locate(Some(Path::new("m.toml")), Some("/env.toml".into()), cwd),
            PathBuf::from("/work/m.toml")
        );
        assert_eq!(
            locate(None, Some("/env.toml".into()), cwd),
            PathBuf::from("/env.toml")
        );
        assert_eq!(locate(None, None, cwd), PathBuf::from("/work/dotsafe.toml"));
        assert_eq!(
            locate(None, Some(OsString::new()), cwd),
            PathBuf::from("/work/dotsafe.toml")
        );
    }
}
