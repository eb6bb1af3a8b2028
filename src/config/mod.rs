//! Configuration: the `dotsafe.toml` manifest and the backup policy it
//! carries.
pub mod backup;
pub mod manifest;
pub mod toml_loader;

pub use manifest::{DeployMethod, FileEntry, Manifest};
