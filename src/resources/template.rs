//! Template rendering and the template resource.
//!
//! Two engines ship: `simple` substitutes `{{ name }}` placeholders from a
//! variable map, `raw` copies the source verbatim.  Rendering goes through
//! the [`TemplateRenderer`] trait so callers can plug in another engine.
use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use super::helpers::fs::{ensure_parent_dir, is_real_dir, is_symlink, occupied};
use super::{Applicable, Resource, ResourceChange, ResourceState};
use crate::error::ValidationError;
use crate::safety::atomic::write_atomic;

/// Variables available to a template.
pub type TemplateVars = BTreeMap<String, String>;

/// Renders template text.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` with `vars`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed or references an
    /// undefined variable.
    fn render(&self, template: &str, vars: &TemplateVars) -> Result<String>;

    /// Render the file `source` into `output`, optionally setting `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, rendering fails, or
    /// the output cannot be written.
    fn render_to_file(
        &self,
        source: &Path,
        output: &Path,
        vars: &TemplateVars,
        mode: Option<u32>,
    ) -> Result<()> {
        let template = std::fs::read_to_string(source)
            .with_context(|| format!("read template: {}", source.display()))?;
        let rendered = self
            .render(&template, vars)
            .with_context(|| format!("render template: {}", source.display()))?;
        ensure_parent_dir(output)?;
        write_atomic(output, rendered.as_bytes())?;
        if let Some(mode) = mode {
            set_mode(output, mode)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Built-in template engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TemplateEngine {
    /// `{{ name }}` substitution.
    #[default]
    Simple,
    /// Verbatim copy.
    Raw,
}

impl TemplateEngine {
    /// The renderer implementing this engine.
    #[must_use]
    pub fn renderer(self) -> Arc<dyn TemplateRenderer> {
        match self {
            Self::Simple => Arc::new(SimpleRenderer),
            Self::Raw => Arc::new(RawRenderer),
        }
    }
}

impl FromStr for TemplateEngine {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "raw" => Ok(Self::Raw),
            _ => Err(ValidationError::UnknownTemplateEngine(s.to_string())),
        }
    }
}

impl TryFrom<String> for TemplateEngine {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::Raw => "raw",
        })
    }
}

/// Replaces `{{ name }}` with `vars["name"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRenderer;

impl TemplateRenderer for SimpleRenderer {
    fn render(&self, template: &str, vars: &TemplateVars) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(rest.get(..start).unwrap_or_default());
            let after = rest.get(start + 2..).unwrap_or_default();
            let end = after
                .find("}}")
                .with_context(|| format!("unclosed placeholder at byte {}", template.len() - rest.len() + start))?;
            let name = after.get(..end).unwrap_or_default().trim();
            let value = vars
                .get(name)
                .with_context(|| format!("undefined template variable '{name}'"))?;
            out.push_str(value);
            rest = after.get(end + 2..).unwrap_or_default();
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Returns the template unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRenderer;

impl TemplateRenderer for RawRenderer {
    fn render(&self, template: &str, _vars: &TemplateVars) -> Result<String> {
        Ok(template.to_string())
    }
}

/// A file at `target` rendered from the template `source`.
#[derive(Clone)]
pub struct TemplateResource {
    /// Template file.
    pub source: PathBuf,
    /// Rendered output path.
    pub target: PathBuf,
    /// Template variables.
    pub vars: TemplateVars,
    renderer: Arc<dyn TemplateRenderer>,
}

impl fmt::Debug for TemplateResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResource")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

impl TemplateResource {
    /// Create a template resource using `renderer`.
    #[must_use]
    pub fn new(
        source: PathBuf,
        target: PathBuf,
        vars: TemplateVars,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            source,
            target,
            vars,
            renderer,
        }
    }

    fn rendered(&self) -> Result<String> {
        let template = std::fs::read_to_string(&self.source)
            .with_context(|| format!("read template: {}", self.source.display()))?;
        self.renderer.render(&template, &self.vars)
    }
}

impl Applicable for TemplateResource {
    fn description(&self) -> String {
        format!("{} <= template {}", self.target.display(), self.source.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        self.renderer
            .render_to_file(&self.source, &self.target, &self.vars, None)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for TemplateResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.source.is_file() {
            return Ok(ResourceState::Invalid {
                reason: format!("template does not exist: {}", self.source.display()),
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
        let existing = std::fs::read(&self.target)
            .with_context(|| format!("read target: {}", self.target.display()))?;
        if existing == self.rendered()?.into_bytes() {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: "rendered content differs".to_string(),
            })
        }
    }
}
