//! Staged, verified installation of downloaded packages.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::hash::{PackageHash, matches_any};
use crate::registry::{ByteStream, PackageMeta};
use crate::staged::StagedFile;
use crate::{Error, Result};

/// A package now present at its target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    /// Final location.
    pub path: PathBuf,
    /// Hash of the installed bytes.
    pub hash: PackageHash,
    /// Size in bytes.
    pub size: u64,
}

/// Stream a package into place, promoting it only if it matches `meta`.
///
/// # Errors
///
/// [`Error::TransferFailed`] when the stream breaks, [`Error::IntegrityMismatch`]
/// when no verifiable checksum in `meta` matches the received bytes, and
/// persistence errors from the staging file. In every error case the target
/// path is left as it was.
#[instrument(skip(stream, meta), fields(target = %target.display()))]
pub async fn install(
    mut stream: ByteStream,
    meta: &PackageMeta,
    target: &Path,
) -> Result<InstalledPackage> {
    let mut staged = StagedFile::create(target).await?;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => staged.write(&bytes).await?,
            Err(e) => {
                staged.discard().await;
                return Err(e);
            }
        }
    }

    let size = staged.written();
    let hash = staged
        .commit_verified(|actual| {
            if matches_any(actual, &meta.hashes) {
                Ok(())
            } else {
                Err(Error::IntegrityMismatch {
                    path: target.into(),
                    expected: meta
                        .hashes
                        .iter()
                        .filter(|h| h.is_verifiable())
                        .map(ToString::to_string)
                        .collect(),
                    actual: actual.to_string(),
                })
            }
        })
        .await?;

    info!(%hash, size, "Installed package");

    Ok(InstalledPackage {
        path: target.to_path_buf(),
        hash,
        size,
    })
}
