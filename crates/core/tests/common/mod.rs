//! In-memory registry used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use provider_mirror_core::{
    ByteStream, DependencyId, PackageHash, PackageLocation, PackageMeta, Platform,
    RegistryClient, RegistryError, Result, ZipHasher,
};
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn hash_of(data: &[u8]) -> PackageHash {
    let mut hasher = ZipHasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn package_bytes(id: &DependencyId, version: &str, platform: &Platform) -> Vec<u8> {
    format!("PK zip of {id} {version} {platform}").into_bytes()
}

#[derive(Clone)]
struct MockPackage {
    bytes: Vec<u8>,
    hashes: Vec<PackageHash>,
    location: PackageLocation,
}

#[derive(Default)]
pub struct MockRegistry {
    versions: HashMap<DependencyId, std::result::Result<Vec<String>, RegistryError>>,
    packages: HashMap<(DependencyId, Version, Platform), MockPackage>,
    by_url: HashMap<String, Vec<u8>>,
    pub version_calls: AtomicUsize,
    pub meta_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions(mut self, id: &DependencyId, versions: &[&str]) -> Self {
        self.versions.insert(
            id.clone(),
            Ok(versions.iter().map(ToString::to_string).collect()),
        );
        self
    }

    pub fn with_unreachable(mut self, id: &DependencyId) -> Self {
        self.versions.insert(
            id.clone(),
            Err(RegistryError::Transport("connection refused".into())),
        );
        self
    }

    /// Publish a correctly checksummed package.
    pub fn with_package(self, id: &DependencyId, version: &str, platform: Platform) -> Self {
        let bytes = package_bytes(id, version, &platform);
        let hashes = vec![hash_of(&bytes)];
        self.with_raw_package(id, version, platform, bytes, hashes)
    }

    /// Publish a package whose advertised checksum does not match its bytes.
    pub fn with_corrupt_package(self, id: &DependencyId, version: &str, platform: Platform) -> Self {
        let bytes = package_bytes(id, version, &platform);
        let hashes = vec![hash_of(b"something else entirely")];
        self.with_raw_package(id, version, platform, bytes, hashes)
    }

    /// Publish a package the client reports at a non-HTTP location.
    pub fn with_local_package(mut self, id: &DependencyId, version: &str, platform: Platform) -> Self {
        let bytes = package_bytes(id, version, &platform);
        self.packages.insert(
            (id.clone(), Version::parse(version).unwrap(), platform),
            MockPackage {
                hashes: vec![hash_of(&bytes)],
                bytes,
                location: PackageLocation::LocalArchive(PathBuf::from("/tmp/pkg.zip")),
            },
        );
        self
    }

    fn with_raw_package(
        mut self,
        id: &DependencyId,
        version: &str,
        platform: Platform,
        bytes: Vec<u8>,
        hashes: Vec<PackageHash>,
    ) -> Self {
        let url = format!(
            "https://releases.example.com/{}/{}/{version}/{platform}.zip",
            id.namespace, id.name
        );
        self.by_url.insert(url.clone(), bytes.clone());
        self.packages.insert(
            (id.clone(), Version::parse(version).unwrap(), platform),
            MockPackage {
                bytes,
                hashes,
                location: PackageLocation::Http(url),
            },
        );
        self
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn meta_calls(&self) -> usize {
        self.meta_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.version_calls() + self.meta_calls() + self.download_calls()
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn available_versions(
        &self,
        dependency: &DependencyId,
    ) -> std::result::Result<Vec<String>, RegistryError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to race on the cache
        tokio::task::yield_now().await;
        self.versions
            .get(dependency)
            .cloned()
            .unwrap_or_else(|| Err(RegistryError::NotFound(format!("{dependency} not found"))))
    }

    async fn package_meta(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> std::result::Result<PackageMeta, RegistryError> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        let package = self
            .packages
            .get(&(dependency.clone(), version.clone(), *platform))
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "provider {dependency} {version} is not available for {platform}"
                ))
            })?;
        Ok(PackageMeta {
            dependency: dependency.clone(),
            version: version.clone(),
            platform: *platform,
            location: package.location.clone(),
            hashes: package.hashes.clone(),
        })
    }

    async fn open_package(&self, url: &str) -> Result<ByteStream> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .by_url
            .get(url)
            .cloned()
            .ok_or_else(|| provider_mirror_core::Error::transfer(url, "404 Not Found"))?;
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let chunks = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Every file under `root` with its content, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.insert(
                    path.strip_prefix(root).unwrap().to_path_buf(),
                    std::fs::read(&path).unwrap(),
                );
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

/// Whether any staging file is left anywhere under `root`.
pub fn has_staging_files(root: &Path) -> bool {
    snapshot(root).keys().any(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
    })
}
