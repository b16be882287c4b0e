//! Package metadata lookup and byte retrieval for one platform.

use semver::Version;
use tracing::{debug, instrument};

use crate::dependency::DependencyId;
use crate::platform::Platform;
use crate::registry::{ByteStream, PackageLocation, PackageMeta, RegistryClient, RegistryError};
use crate::{Error, Result};

/// Metadata whose location has been checked to be downloadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedPackage {
    /// Registry metadata.
    pub meta: PackageMeta,
    /// HTTP(S) URL taken from the metadata location.
    pub url: String,
}

/// A located package with an open byte stream.
pub struct FetchedPackage {
    /// Where the bytes come from.
    pub located: LocatedPackage,
    /// The package bytes.
    pub stream: ByteStream,
}

impl std::fmt::Debug for FetchedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedPackage")
            .field("located", &self.located)
            .finish_non_exhaustive()
    }
}

/// Retrieves packages for resolved (dependency, version, platform) triples.
pub struct Fetcher<'a> {
    client: &'a dyn RegistryClient,
}

impl<'a> Fetcher<'a> {
    /// Create a fetcher backed by `client`.
    #[must_use]
    pub fn new(client: &'a dyn RegistryClient) -> Self {
        Self { client }
    }

    /// Look up metadata and check that its location can be downloaded.
    ///
    /// # Errors
    ///
    /// [`Error::PackageUnavailable`] when the registry has no package for
    /// this platform or cannot be reached, [`Error::UnsupportedLocationKind`]
    /// when the client returns a non-HTTP location.
    #[instrument(skip(self), fields(%dependency, %version, %platform))]
    pub async fn locate(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> Result<LocatedPackage> {
        let meta = self
            .client
            .package_meta(dependency, version, platform)
            .await
            .map_err(|e| {
                let message = match e {
                    RegistryError::NotFound(msg) => msg,
                    RegistryError::Transport(msg) => format!("registry request failed: {msg}"),
                };
                Error::PackageUnavailable {
                    dependency: dependency.to_string(),
                    version: version.clone(),
                    platform: *platform,
                    message,
                }
            })?;

        let url = match &meta.location {
            PackageLocation::Http(url) if is_http_url(url) => url.clone(),
            other => {
                return Err(Error::UnsupportedLocationKind {
                    dependency: dependency.to_string(),
                    version: version.clone(),
                    platform: *platform,
                    kind: match other {
                        PackageLocation::Http(_) => "non-HTTP URL",
                        _ => other.kind(),
                    },
                });
            }
        };

        debug!(%url, hashes = meta.hashes.len(), "Located package");
        Ok(LocatedPackage { meta, url })
    }

    /// Open the byte stream for an already located package.
    ///
    /// # Errors
    ///
    /// [`Error::TransferFailed`] when the download cannot be started.
    pub async fn open(&self, located: LocatedPackage) -> Result<FetchedPackage> {
        let stream = self.client.open_package(&located.url).await?;
        Ok(FetchedPackage { located, stream })
    }

    /// Locate and open in one step.
    pub async fn fetch(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> Result<FetchedPackage> {
        let located = self.locate(dependency, version, platform).await?;
        self.open(located).await
    }
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    (lower.starts_with("https://") && lower.len() > "https://".len())
        || (lower.starts_with("http://") && lower.len() > "http://".len())
}
