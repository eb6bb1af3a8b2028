//! TOML file loading.
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read and deserialize the TOML file at `path`.
///
/// Unlike an optional config fragment, a missing file is an error here: the
/// message names the absolute path that was looked up.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be read, or is not
/// valid for `T`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        bail!("config file not found: {}", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse(&content, path)
}

/// Deserialize TOML `content`; `origin` only labels errors.
///
/// # Errors
///
/// Returns an error if `content` is not valid TOML for `T`.
pub fn parse<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<T> {
    toml::from_str(content)
        .with_context(|| format!("Failed to parse TOML config: {}", origin.display()))
}
