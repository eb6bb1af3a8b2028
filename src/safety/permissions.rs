//! Permission mode parsing, glob-rule resolution, and application.
//!
//! Rules map glob patterns to octal mode strings.  When several rules match a
//! file, the most specific one wins:
//!
//! 1. fewer wildcard characters (`*`, `?`);
//! 2. on a tie, more literal (non-wildcard) characters;
//! 3. on a full tie, the lexicographically smallest pattern.
//!
//! So for `id_rsa.pub`, `*.pub` (1 wildcard, 4 literals) beats `id_*`
//! (1 wildcard, 3 literals).  Directories always receive the configured
//! directory mode; rules only apply to files.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};

use crate::error::{IoResultExt as _, SafetyResult, ValidationError};

/// Highest mode accepted by [`parse_mode`].
pub const MAX_MODE: u32 = 0o777;

/// Default mode for files when no rule matches.
pub const DEFAULT_FILE_MODE: &str = "0644";

/// Default mode for directories.
pub const DEFAULT_DIRECTORY_MODE: &str = "0755";

/// Parse an octal permission string (`"644"`, `"0644"`, `"0o644"`).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidMode`] if the string is empty, contains
/// a non-octal digit, or exceeds `0o777`.
///
/// # Examples
///
/// ```
/// use dotsafe::safety::permissions::parse_mode;
///
/// assert_eq!(parse_mode("0777").unwrap(), 0o777);
/// assert!(parse_mode("0999").is_err());
/// assert!(parse_mode("abc").is_err());
/// ```
pub fn parse_mode(mode: &str) -> Result<u32, ValidationError> {
    let digits = mode.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let invalid = || ValidationError::InvalidMode(mode.to_string());
    if digits.is_empty() || !digits.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(invalid());
    }
    let value = u32::from_str_radix(digits, 8).map_err(|_| invalid())?;
    if value > MAX_MODE {
        return Err(invalid());
    }
    Ok(value)
}

/// Render a mode as a four-digit octal string (`0644`).
#[must_use]
pub fn format_mode(mode: u32) -> String {
    format!("{mode:04o}")
}

/// One compiled permission rule.
#[derive(Debug, Clone)]
struct PermissionRule {
    pattern: String,
    mode: String,
    matcher: GlobMatcher,
    wildcards: usize,
    literals: usize,
}

impl PermissionRule {
    fn new(pattern: String, mode: String) -> Result<Self, ValidationError> {
        parse_mode(&mode)?;
        let matcher = Glob::new(&pattern)
            .map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?
            .compile_matcher();
        let wildcards = pattern.chars().filter(|c| matches!(c, '*' | '?')).count();
        let literals = pattern.chars().count() - wildcards;
        Ok(Self {
            pattern,
            mode,
            matcher,
            wildcards,
            literals,
        })
    }

    /// Patterns containing a separator match the path relative to the tree
    /// root; all others match the bare file name.
    fn is_match(&self, file_name: &str, relative: &Path) -> bool {
        if self.pattern.contains('/') {
            self.matcher.is_match(relative)
        } else {
            self.matcher.is_match(file_name)
        }
    }

    const fn more_specific_than(&self, other: &Self) -> bool {
        self.wildcards < other.wildcards
            || (self.wildcards == other.wildcards && self.literals > other.literals)
    }
}

/// A validated set of glob → mode rules.
///
/// Patterns and modes are checked when the set is built, so resolution never
/// fails on a malformed rule.
#[derive(Debug, Clone, Default)]
pub struct PermissionRules {
    /// Sorted by pattern so full ties resolve deterministically.
    rules: Vec<PermissionRule>,
}

impl PermissionRules {
    /// Compile `rules`, failing fast on the first invalid pattern or mode.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPattern`] or
    /// [`ValidationError::InvalidMode`].
    pub fn new<I, K, V>(rules: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sorted: BTreeMap<String, String> = rules
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let rules = sorted
            .into_iter()
            .map(|(pattern, mode)| PermissionRule::new(pattern, mode))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Number of rules.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the mode for a bare file name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMode`] if `default_mode` is not a
    /// valid mode.
    pub fn resolve(&self, file_name: &str, default_mode: &str) -> Result<String, ValidationError> {
        self.resolve_relative(file_name, Path::new(file_name), default_mode)
    }

    /// Resolve the mode for a file at `relative` (relative to the tree root)
    /// whose last component is `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMode`] if `default_mode` is invalid.
    pub fn resolve_relative(
        &self,
        file_name: &str,
        relative: &Path,
        default_mode: &str,
    ) -> Result<String, ValidationError> {
        parse_mode(default_mode)?;
        let mut best: Option<&PermissionRule> = None;
        for rule in self.rules.iter().filter(|r| r.is_match(file_name, relative)) {
            best = match best {
                Some(current) if !rule.more_specific_than(current) => Some(current),
                _ => Some(rule),
            };
        }
        Ok(best.map_or_else(|| default_mode.to_string(), |r| r.mode.clone()))
    }
}

/// Resolve the effective mode for `file_name` from `rules`, falling back to
/// `default_mode`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidMode`] if `default_mode` is invalid.
pub fn resolve(
    file_name: &str,
    rules: &PermissionRules,
    default_mode: &str,
) -> Result<String, ValidationError> {
    rules.resolve(file_name, default_mode)
}

/// Resolved permission policy for one file-tree operation.
#[derive(Debug, Clone)]
pub struct PermissionConfig {
    /// Default mode for files.
    pub file_mode: String,
    /// Mode for directories.
    pub directory_mode: String,
    /// Walk the whole tree instead of only the target.
    pub recursive: bool,
    /// Per-pattern file mode overrides.
    pub rules: PermissionRules,
}

impl PermissionConfig {
    /// Build a validated permission config.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMode`] if either mode is invalid.
    pub fn new(
        file_mode: impl Into<String>,
        directory_mode: impl Into<String>,
        recursive: bool,
        rules: PermissionRules,
    ) -> Result<Self, ValidationError> {
        let file_mode = file_mode.into();
        let directory_mode = directory_mode.into();
        parse_mode(&file_mode)?;
        parse_mode(&directory_mode)?;
        Ok(Self {
            file_mode,
            directory_mode,
            recursive,
            rules,
        })
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            file_mode: DEFAULT_FILE_MODE.to_string(),
            directory_mode: DEFAULT_DIRECTORY_MODE.to_string(),
            recursive: false,
            rules: PermissionRules::default(),
        }
    }
}

/// Counts of entries whose mode was set by [`apply_rules`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionReport {
    /// Files updated.
    pub files: usize,
    /// Directories updated.
    pub directories: usize,
}

/// The mode one entry should end up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeAssignment {
    /// Entry path.
    pub path: PathBuf,
    /// Desired mode bits.
    pub mode: u32,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Every entry `config` governs under `target`, with its desired mode.
///
/// Non-recursive: only `target` itself.  Recursive: every entry under a
/// directory target; symlinks are never visited.
///
/// # Errors
///
/// Returns an error naming the entry that could not be read, or a
/// validation error for an invalid mode.
pub fn plan_modes(target: &Path, config: &PermissionConfig) -> SafetyResult<Vec<ModeAssignment>> {
    let mut plan = Vec::new();
    let meta = std::fs::symlink_metadata(target).at_path(target)?;
    if meta.is_dir() {
        plan.push(ModeAssignment {
            path: target.to_path_buf(),
            mode: parse_mode(&config.directory_mode)?,
            is_dir: true,
        });
        if config.recursive {
            walk(target, target, config, &mut plan)?;
        }
    } else {
        let mode = config.rules.resolve(&file_name(target), &config.file_mode)?;
        plan.push(ModeAssignment {
            path: target.to_path_buf(),
            mode: parse_mode(&mode)?,
            is_dir: false,
        });
    }
    Ok(plan)
}

/// The subset of [`plan_modes`] whose current mode differs.  Always empty
/// on platforms without Unix modes.
///
/// # Errors
///
/// See [`plan_modes`].
pub fn pending_modes(
    target: &Path,
    config: &PermissionConfig,
) -> SafetyResult<Vec<ModeAssignment>> {
    let mut pending = Vec::new();
    for assignment in plan_modes(target, config)? {
        if current_mode(&assignment.path)?.is_some_and(|m| m != assignment.mode) {
            pending.push(assignment);
        }
    }
    Ok(pending)
}

/// Apply `config` to `target`.
///
/// # Errors
///
/// Returns [`SafetyError::Io`](crate::error::SafetyError::Io) naming the
/// entry whose mode could not be read or set.
pub fn apply_rules(target: &Path, config: &PermissionConfig) -> SafetyResult<PermissionReport> {
    let mut report = PermissionReport::default();
    for assignment in plan_modes(target, config)? {
        set_mode(&assignment.path, assignment.mode)?;
        if assignment.is_dir {
            report.directories += 1;
        } else {
            report.files += 1;
        }
    }
    Ok(report)
}

fn walk(
    root: &Path,
    dir: &Path,
    config: &PermissionConfig,
    plan: &mut Vec<ModeAssignment>,
) -> SafetyResult<()> {
    let directory_mode = parse_mode(&config.directory_mode)?;
    for entry in std::fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        let path = entry.path();
        let file_type = entry.file_type().at_path(&path)?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            plan.push(ModeAssignment {
                path: path.clone(),
                mode: directory_mode,
                is_dir: true,
            });
            walk(root, &path, config, plan)?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let mode = config
                .rules
                .resolve_relative(&file_name(&path), relative, &config.file_mode)?;
            plan.push(ModeAssignment {
                mode: parse_mode(&mode)?,
                path,
                is_dir: false,
            });
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> SafetyResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).at_path(path)?;
    tracing::debug!(path = %path.display(), mode = %format_mode(mode), "set permissions");
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> SafetyResult<()> {
    tracing::debug!(path = %path.display(), mode = %format_mode(mode), "permissions not supported on this platform");
    Ok(())
}

#[cfg(unix)]
fn current_mode(path: &Path) -> SafetyResult<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::symlink_metadata(path).at_path(path)?;
    Ok(Some(meta.permissions().mode() & MAX_MODE))
}

#[cfg(not(unix))]
fn current_mode(path: &Path) -> SafetyResult<Option<u32>> {
    std::fs::symlink_metadata(path).at_path(path)?;
    Ok(None)
}
