//! Content digests for change detection and backup deduplication.
use std::fmt::Write as _;
use std::io::Read as _;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{IoResultExt as _, SafetyResult};

/// Length of the hex prefix used by `git_style` backup names.
pub const SHORT_HASH_LEN: usize = 8;

/// Compute the lowercase hex SHA-256 digest of the file at `path`.
///
/// Only content is hashed; metadata (mode, timestamps) never affects the
/// result.
///
/// # Errors
///
/// Returns [`SafetyError::Io`](crate::error::SafetyError::Io) if the file
/// cannot be read.
pub fn digest(path: &Path) -> SafetyResult<String> {
    let bytes = std::fs::read(path).at_path(path)?;
    Ok(digest_bytes(&bytes))
}

/// Compute the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

/// Digest the original content stored in a backup artifact.
///
/// When `compressed` is set the artifact is gunzipped before hashing, so the
/// result is comparable with [`digest`] of the file it was taken from.
///
/// # Errors
///
/// Returns an error if the artifact cannot be read or decompressed.
pub fn digest_artifact(path: &Path, compressed: bool) -> SafetyResult<String> {
    if !compressed {
        return digest(path);
    }
    let file = std::fs::File::open(path).at_path(path)?;
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = decoder.read(&mut buf).at_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(buf.get(..n).unwrap_or_default());
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Return the `git_style` short form of a full hex digest.
#[must_use]
pub fn short_hash(checksum: &str) -> &str {
    checksum.get(..SHORT_HASH_LEN).unwrap_or(checksum)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // write! to a String is infallible; unwrap_or(()) makes that explicit.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    hex
}
