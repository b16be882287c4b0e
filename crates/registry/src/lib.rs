//! HTTP registry client for provider-mirror.
//!
//! Talks to the provider registry API of each host:
//!
//! - `GET {base}/{namespace}/{name}/versions`
//! - `GET {base}/{namespace}/{name}/{version}/download/{os}/{arch}`
//!
//! `{base}` defaults to `https://{hostname}/v1/providers/` and can be
//! overridden per host. No service discovery or authentication is
//! performed.

use async_trait::async_trait;
use futures::StreamExt;
use provider_mirror_core::{
    ByteStream, DependencyId, Error, PackageHash, PackageLocation, PackageMeta, Platform,
    RegistryClient, RegistryError, Result,
};
use reqwest::{Client, StatusCode, Url};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for a single registry request, including body transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// User agent sent with every request.
const USER_AGENT: &str = concat!("provider-mirror/", env!("CARGO_PKG_VERSION"));

/// `GET .../versions` response.
#[derive(Debug, Deserialize)]
struct VersionsResponse {
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

/// `GET .../download/{os}/{arch}` response.
#[derive(Debug, Deserialize)]
struct DownloadResponse {
    download_url: String,
    #[serde(default)]
    shasum: Option<String>,
}

/// Providers API base URL per registry host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryEndpoints {
    overrides: BTreeMap<String, Url>,
}

impl RegistryEndpoints {
    /// Endpoints with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `url` as the providers API base for `hostname`.
    pub fn with_override(mut self, hostname: &str, url: &str) -> Result<Self> {
        let url = parse_base(url).ok_or_else(|| {
            Error::configuration(format!("Invalid registry URL {url:?} for host {hostname}"))
        })?;
        self.overrides.insert(hostname.to_lowercase(), url);
        Ok(self)
    }

    /// Providers API base for `hostname`.
    pub fn base_url(&self, hostname: &str) -> std::result::Result<Url, RegistryError> {
        if let Some(url) = self.overrides.get(hostname) {
            return Ok(url.clone());
        }
        parse_base(&format!("https://{hostname}/v1/providers/"))
            .ok_or_else(|| RegistryError::Transport(format!("invalid registry host {hostname:?}")))
    }

    fn versions_url(&self, dependency: &DependencyId) -> std::result::Result<Url, RegistryError> {
        join(
            &self.base_url(&dependency.hostname)?,
            &format!("{}/{}/versions", dependency.namespace, dependency.name),
        )
    }

    fn download_url(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> std::result::Result<Url, RegistryError> {
        join(
            &self.base_url(&dependency.hostname)?,
            &format!(
                "{}/{}/{version}/download/{}/{}",
                dependency.namespace, dependency.name, platform.os, platform.arch
            ),
        )
    }
}

/// Parse a base URL, forcing a trailing slash so relative joins append.
fn parse_base(raw: &str) -> Option<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).ok()
}

fn join(base: &Url, relative: &str) -> std::result::Result<Url, RegistryError> {
    base.join(relative)
        .map_err(|e| RegistryError::Transport(format!("invalid registry URL: {e}")))
}

/// Registry client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: Client,
    endpoints: RegistryEndpoints,
}

impl HttpRegistryClient {
    /// Create a client with a per-request `timeout`.
    pub fn new(endpoints: RegistryEndpoints, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, endpoints })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        not_found: impl FnOnce() -> String,
    ) -> std::result::Result<T, RegistryError> {
        debug!(%url, "Registry request");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RegistryError::Transport(describe(&e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(not_found())),
            status if !status.is_success() => Err(RegistryError::Transport(format!(
                "{url} returned HTTP {status}"
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| RegistryError::Transport(format!("invalid response from {url}: {e}"))),
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn available_versions(
        &self,
        dependency: &DependencyId,
    ) -> std::result::Result<Vec<String>, RegistryError> {
        let url = self.endpoints.versions_url(dependency)?;
        let response: VersionsResponse = self
            .get_json(&url, || format!("provider {dependency} does not exist"))
            .await?;
        info!(%dependency, count = response.versions.len(), "Listed available versions");
        Ok(response.versions.into_iter().map(|v| v.version).collect())
    }

    async fn package_meta(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> std::result::Result<PackageMeta, RegistryError> {
        let url = self.endpoints.download_url(dependency, version, platform)?;
        let response: DownloadResponse = self
            .get_json(&url, || {
                format!("provider {dependency} {version} is not available for {platform}")
            })
            .await?;

        let location = package_location(&url, &response.download_url)?;
        let hashes = response
            .shasum
            .as_deref()
            .and_then(PackageHash::parse)
            .into_iter()
            .collect();

        Ok(PackageMeta {
            dependency: dependency.clone(),
            version: version.clone(),
            platform: *platform,
            location,
            hashes,
        })
    }

    async fn open_package(&self, url: &str) -> Result<ByteStream> {
        debug!(%url, "Downloading package");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transfer(url, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transfer(url, format!("HTTP {status}")));
        }

        let owned = url.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Error::transfer(&owned, describe(&e))))
            .boxed())
    }
}

/// Resolve a `download_url` (possibly relative) against the metadata URL.
fn package_location(
    metadata_url: &Url,
    download_url: &str,
) -> std::result::Result<PackageLocation, RegistryError> {
    let url = metadata_url.join(download_url).map_err(|e| {
        RegistryError::Transport(format!("invalid download URL {download_url:?}: {e}"))
    })?;
    Ok(match url.scheme() {
        "http" | "https" => PackageLocation::Http(url.to_string()),
        "file" => {
            let path = url.to_file_path().unwrap_or_else(|()| PathBuf::from(url.path()));
            if download_url.ends_with('/') {
                PackageLocation::LocalDir(path)
            } else {
                PackageLocation::LocalArchive(path)
            }
        }
        other => {
            return Err(RegistryError::Transport(format!(
                "unsupported download URL scheme {other:?}"
            )));
        }
    })
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
