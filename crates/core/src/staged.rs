//! Scoped durable writes.
//!
//! A [`StagedFile`] writes to a hidden sibling of its target (the target
//! filename prefixed with [`STAGING_PREFIX`]), hashing everything written.
//! The content only becomes visible at the target through
//! [`StagedFile::commit`] or [`StagedFile::commit_verified`], which fsync and
//! then rename within the same directory. Dropping an uncommitted
//! `StagedFile` (including when its future is cancelled) removes the staging
//! file.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::hash::{PackageHash, ZipHasher};
use crate::{Error, Result};

/// Leading character reserved for staging files.
///
/// Package and index filenames never start with it.
pub const STAGING_PREFIX: char = '.';

/// Staging path for `target`: same directory, prefixed filename.
#[must_use]
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{STAGING_PREFIX}{name}"))
}

/// An in-progress write that is either committed or discarded.
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
    file: Option<tokio::fs::File>,
    hasher: ZipHasher,
    written: u64,
    finished: bool,
}

impl StagedFile {
    /// Open the staging file for `target`, creating parent directories.
    ///
    /// A staging file left behind by an earlier interrupted run is truncated.
    pub async fn create(target: &Path) -> Result<Self> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, parent, "create directory"))?;
        }

        let staging = staging_path(target);
        let file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| Error::io(e, &staging, "create"))?;

        debug!(staging = %staging.display(), "Opened staging file");

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            file: Some(file),
            hasher: ZipHasher::new(),
            written: 0,
            finished: false,
        })
    }

    /// Hidden path currently being written.
    #[must_use]
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Append a chunk.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::io(
                std::io::Error::other("staging file already closed"),
                &self.staging,
                "write",
            ));
        };
        file.write_all(chunk)
            .await
            .map_err(|e| Error::io(e, &self.staging, "write"))?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Promote the staged content to the target path.
    pub async fn commit(self) -> Result<PackageHash> {
        self.commit_verified(|_| Ok(())).await
    }

    /// Promote the staged content only if `verify` accepts its hash.
    ///
    /// When `verify` (or the flush) fails the staging file is discarded and
    /// the target path is left untouched.
    pub async fn commit_verified<F>(mut self, verify: F) -> Result<PackageHash>
    where
        F: FnOnce(&PackageHash) -> Result<()>,
    {
        if let Err(e) = self.flush().await {
            self.discard().await;
            return Err(e);
        }

        let hash = std::mem::take(&mut self.hasher).finalize();
        if let Err(e) = verify(&hash) {
            self.discard().await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&self.staging, &self.target).await {
            let err = Error::io(e, &self.target, "rename");
            self.discard().await;
            return Err(err);
        }

        self.finished = true;
        debug!(target = %self.target.display(), %hash, bytes = self.written, "Committed staged file");
        Ok(hash)
    }

    /// Remove the staging file without touching the target.
    ///
    /// Removal is best effort; failures are logged.
    pub async fn discard(mut self) {
        drop(self.file.take());
        self.finished = true;
        if let Err(e) = tokio::fs::remove_file(&self.staging).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(staging = %self.staging.display(), error = %e, "Failed to remove staging file");
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::io(e, &self.staging, "flush"))?;
            file.sync_all()
                .await
                .map_err(|e| Error::io(e, &self.staging, "sync"))?;
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.staging)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(staging = %self.staging.display(), error = %e, "Failed to remove abandoned staging file");
        }
    }
}

/// Durably replace `target` with `contents`.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> Result<PackageHash> {
    let mut staged = StagedFile::create(target).await?;
    staged.write(contents).await?;
    staged.commit().await
}
