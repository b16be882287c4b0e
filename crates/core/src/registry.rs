//! Registry client boundary.
//!
//! The mirror builder talks to an upstream registry only through
//! [`RegistryClient`]: list versions, look up package metadata for one
//! version and platform, and stream package bytes from a location.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use semver::Version;
use std::path::PathBuf;
use thiserror::Error;

use crate::Result;
use crate::dependency::DependencyId;
use crate::hash::PackageHash;
use crate::platform::Platform;

/// Stream of package bytes. Errors are [`crate::Error::TransferFailed`].
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Where a package can be obtained from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocation {
    /// An `http://` or `https://` URL.
    Http(String),
    /// A zip archive on the local filesystem.
    LocalArchive(PathBuf),
    /// An unpacked package directory on the local filesystem.
    LocalDir(PathBuf),
}

impl PackageLocation {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "HTTP URL",
            Self::LocalArchive(_) => "local archive",
            Self::LocalDir(_) => "local directory",
        }
    }
}

/// Metadata for one package: a (dependency, version, platform) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    /// Dependency the package belongs to.
    pub dependency: DependencyId,
    /// Package version.
    pub version: Version,
    /// Package platform.
    pub platform: Platform,
    /// Download location.
    pub location: PackageLocation,
    /// Expected checksums.
    pub hashes: Vec<PackageHash>,
}

/// Failure reported by a registry client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry answered, but has nothing for the request.
    #[error("{0}")]
    NotFound(String),
    /// The registry could not be reached or answered garbage.
    #[error("{0}")]
    Transport(String),
}

/// Upstream registry used to populate the mirror.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every version string published for `dependency`.
    async fn available_versions(
        &self,
        dependency: &DependencyId,
    ) -> std::result::Result<Vec<String>, RegistryError>;

    /// Metadata for the exact (dependency, version, platform) triple.
    async fn package_meta(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> std::result::Result<PackageMeta, RegistryError>;

    /// Open a byte stream for an HTTP location.
    async fn open_package(&self, url: &str) -> Result<ByteStream>;
}
