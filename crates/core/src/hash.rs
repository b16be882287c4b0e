//! Package checksums.
//!
//! Hashes are written `scheme:value`. The only scheme computed locally is
//! `zh:`, the lowercase hex SHA-256 of the package archive exactly as
//! downloaded. Other schemes (such as `h1:`) are carried through from the
//! registry and preserved in indexes, but never used for verification.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::{Error, Result};

/// Scheme prefix for archive SHA-256 hashes.
pub const ZIP_HASH_SCHEME: &str = "zh:";

/// A package checksum with its scheme prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageHash(String);

impl PackageHash {
    /// Build a `zh:` hash from a hex SHA-256 digest.
    #[must_use]
    pub fn zip_sha256(hex_digest: &str) -> Self {
        Self(format!("{ZIP_HASH_SCHEME}{}", hex_digest.to_lowercase()))
    }

    /// Parse `scheme:value`. A bare 64-character hex string is taken as `zh:`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(Self::zip_sha256(raw));
        }
        let (scheme, value) = raw.split_once(':')?;
        if scheme.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Whether this hash can be checked against a downloaded archive.
    #[must_use]
    pub fn is_verifiable(&self) -> bool {
        self.0.starts_with(ZIP_HASH_SCHEME)
    }

    /// The full `scheme:value` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental `zh:` hasher fed while streaming.
#[derive(Default)]
pub struct ZipHasher {
    inner: Sha256,
}

impl ZipHasher {
    /// Start a new hash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the `zh:` hash.
    #[must_use]
    pub fn finalize(self) -> PackageHash {
        PackageHash::zip_sha256(&hex::encode(self.inner.finalize()))
    }
}

/// Hash an archive already on disk.
///
/// Returns `None` when the file does not exist.
pub async fn hash_file(path: &Path) -> Result<Option<PackageHash>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(e, path, "open")),
    };

    let mut hasher = ZipHasher::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| Error::io(e, path, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Some(hasher.finalize()))
}

/// Whether `actual` equals any verifiable hash in `expected`.
#[must_use]
pub fn matches_any(actual: &PackageHash, expected: &[PackageHash]) -> bool {
    expected
        .iter()
        .any(|h| h.is_verifiable() && h == actual)
}
