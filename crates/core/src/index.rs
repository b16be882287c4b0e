//! Per-dependency mirror index.
//!
//! Each dependency directory carries an `index.json` listing every
//! version and platform present, with the package filename and its hashes:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "provider": "registry.example.com/ns/foo",
//!   "versions": {
//!     "1.2.0": {
//!       "linux_amd64": {
//!         "filename": "terraform-provider-foo_1.2.0_linux_amd64.zip",
//!         "hashes": ["zh:…"]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Keys are ordered (versions by semver, platforms by OS then architecture)
//! and nothing time-dependent is stored, so rewriting an unchanged mirror
//! produces byte-identical files.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::dependency::DependencyId;
use crate::hash::{PackageHash, hash_file};
use crate::layout::{MirrorLayout, parse_package_filename};
use crate::platform::Platform;
use crate::staged::write_atomic;
use crate::{Error, Result};

/// Current index format version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// One mirrored package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Package filename, relative to the index.
    pub filename: String,
    /// Known hashes, sorted and deduplicated.
    pub hashes: Vec<PackageHash>,
}

impl IndexEntry {
    /// Create an entry, normalizing hash order.
    #[must_use]
    pub fn new(filename: impl Into<String>, hashes: impl IntoIterator<Item = PackageHash>) -> Self {
        let mut hashes: Vec<PackageHash> = hashes.into_iter().collect();
        hashes.sort();
        hashes.dedup();
        Self {
            filename: filename.into(),
            hashes,
        }
    }

    /// Whether `hash` is one of the recorded hashes.
    #[must_use]
    pub fn records(&self, hash: &PackageHash) -> bool {
        self.hashes.contains(hash)
    }
}

/// A package this run placed (or confirmed) in the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    /// Package version.
    pub version: Version,
    /// Package platform.
    pub platform: Platform,
    /// Index entry for it.
    pub entry: IndexEntry,
}

/// What was found at an index path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFile {
    /// No index yet.
    Missing,
    /// A file exists but cannot be parsed; it is rebuilt from disk.
    Malformed {
        /// Parser error.
        reason: String,
    },
    /// A usable index.
    Present(MirrorIndex),
}

/// The index document for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorIndex {
    /// Format version for future migrations.
    pub format_version: u32,
    /// Dependency the index describes.
    pub provider: DependencyId,
    /// version -> platform -> entry.
    #[serde(default)]
    pub versions: BTreeMap<Version, BTreeMap<Platform, IndexEntry>>,
}

impl MirrorIndex {
    /// Empty index for `provider`.
    #[must_use]
    pub fn new(provider: DependencyId) -> Self {
        Self {
            format_version: INDEX_FORMAT_VERSION,
            provider,
            versions: BTreeMap::new(),
        }
    }

    /// Read an index from disk, telling a missing file from a malformed one.
    ///
    /// A file written by a newer format version is an error.
    pub async fn read(path: &Path) -> Result<IndexFile> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexFile::Missing),
            Err(e) => return Err(Error::io(e, path, "read")),
        };

        let index: Self = match serde_json::from_slice(&content) {
            Ok(index) => index,
            Err(e) => {
                return Ok(IndexFile::Malformed {
                    reason: e.to_string(),
                });
            }
        };

        if index.format_version > INDEX_FORMAT_VERSION {
            return Err(Error::serialization(
                path,
                format!(
                    "index format version {} is newer than supported version {}",
                    index.format_version, INDEX_FORMAT_VERSION
                ),
            ));
        }

        Ok(IndexFile::Present(index))
    }

    /// Load an index from disk.
    ///
    /// Returns `None` if the file doesn't exist or is malformed (it is then
    /// rebuilt from the packages on disk).
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match Self::read(path).await? {
            IndexFile::Present(index) => Ok(Some(index)),
            IndexFile::Malformed { reason } => {
                warn!(path = %path.display(), error = %reason, "Ignoring malformed index, rebuilding from disk");
                Ok(None)
            }
            IndexFile::Missing => Ok(None),
        }
    }

    /// Entry for a version and platform, if present.
    #[must_use]
    pub fn get(&self, version: &Version, platform: &Platform) -> Option<&IndexEntry> {
        self.versions.get(version)?.get(platform)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, version: Version, platform: Platform, entry: IndexEntry) {
        self.versions
            .entry(version)
            .or_default()
            .insert(platform, entry);
    }

    /// Whether an entry exists for the pair.
    #[must_use]
    pub fn contains(&self, version: &Version, platform: &Platform) -> bool {
        self.get(version, platform).is_some()
    }

    /// Iterate over every (version, platform, entry).
    pub fn entries(&self) -> impl Iterator<Item = (&Version, &Platform, &IndexEntry)> {
        self.versions
            .iter()
            .flat_map(|(v, platforms)| platforms.iter().map(move |(p, e)| (v, p, e)))
    }

    /// Total number of packages listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.values().map(BTreeMap::len).sum()
    }

    /// Whether no package is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable pretty-printed JSON, newline terminated.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Rebuild and write the index of `dependency`.
///
/// The result is the union of, in increasing precedence:
/// 1. entries of `existing` whose package file is still on disk,
/// 2. package files on disk that follow the naming convention but were
///    never indexed (hashed now),
/// 3. `fresh` records produced by this run.
///
/// Nothing is written when the union is empty and no index existed.
pub async fn write_index(
    layout: &MirrorLayout,
    dependency: &DependencyId,
    existing: Option<&MirrorIndex>,
    fresh: &[MirrorRecord],
) -> Result<MirrorIndex> {
    let dir = layout.dependency_dir(dependency);
    let mut index = MirrorIndex::new(dependency.clone());

    if let Some(existing) = existing {
        for (version, platform, entry) in existing.entries() {
            if tokio::fs::try_exists(dir.join(&entry.filename))
                .await
                .unwrap_or(false)
            {
                index.insert(version.clone(), *platform, entry.clone());
            } else {
                debug!(%dependency, %version, %platform, "Dropping index entry for missing package");
            }
        }
    }

    for (version, platform, filename) in scan_packages(&dir, dependency).await? {
        let claimed = index.contains(&version, &platform)
            || fresh
                .iter()
                .any(|r| r.version == version && r.platform == platform);
        if claimed {
            continue;
        }
        if let Some(hash) = hash_file(&dir.join(&filename)).await? {
            debug!(%dependency, %version, %platform, "Indexing package found on disk");
            index.insert(version, platform, IndexEntry::new(filename, [hash]));
        }
    }

    for record in fresh {
        index.insert(
            record.version.clone(),
            record.platform,
            record.entry.clone(),
        );
    }

    let path = layout.index_path(dependency);
    if index.is_empty() && existing.is_none() {
        debug!(%dependency, "Nothing mirrored, not writing an index");
        return Ok(index);
    }

    let json = index
        .to_json()
        .map_err(|e| Error::serialization(&path, e.to_string()))?;
    write_atomic(&path, &json).await?;

    info!(%dependency, packages = index.len(), path = %path.display(), "Wrote mirror index");
    Ok(index)
}

/// Package files of `dependency` in `dir`, sorted by filename.
async fn scan_packages(
    dir: &Path,
    dependency: &DependencyId,
) -> Result<Vec<(Version, Platform, String)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, dir, "read directory")),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io(e, dir, "read directory"))?
    {
        let Ok(filename) = entry.file_name().into_string() else {
            continue;
        };
        if let Some((version, platform)) = parse_package_filename(dependency, &filename) {
            found.push((version, platform, filename));
        }
    }
    found.sort_by(|a, b| a.2.cmp(&b.2));
    Ok(found)
}

/// Rebuild every index under a mirror root from the packages on disk.
///
/// Walks `<root>/<hostname>/<namespace>/<name>` and returns the dependencies
/// whose index was written.
pub async fn rebuild_all(layout: &MirrorLayout) -> Result<Vec<MirrorIndex>> {
    let mut rebuilt = Vec::new();
    for hostname in list_dirs(layout.root()).await? {
        let host_dir = layout.root().join(&hostname);
        for namespace in list_dirs(&host_dir).await? {
            let ns_dir = host_dir.join(&namespace);
            for name in list_dirs(&ns_dir).await? {
                let dependency = DependencyId::new(hostname.clone(), namespace.clone(), name);
                let existing = MirrorIndex::load(&layout.index_path(&dependency)).await?;
                let index = write_index(layout, &dependency, existing.as_ref(), &[]).await?;
                if !index.is_empty() || existing.is_some() {
                    rebuilt.push(index);
                }
            }
        }
    }
    Ok(rebuilt)
}

async fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io(e, dir, "read directory"))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io(e, dir, "read directory"))?
    {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if let (true, Ok(name)) = (is_dir, entry.file_name().into_string())
            && !name.starts_with('.')
        {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ZipHasher;
    use crate::layout::package_filename;
    use crate::platform::{Arch, Os};
    use tempfile::TempDir;

    fn foo() -> DependencyId {
        DependencyId::new("registry.example.com", "ns", "foo")
    }

    fn hash_of(data: &[u8]) -> PackageHash {
        let mut hasher = ZipHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    fn record(version: &str, platform: Platform, data: &[u8]) -> MirrorRecord {
        let version = Version::parse(version).unwrap();
        MirrorRecord {
            entry: IndexEntry::new(package_filename(&foo(), &version, &platform), [hash_of(data)]),
            version,
            platform,
        }
    }

    fn place(layout: &MirrorLayout, r: &MirrorRecord, data: &[u8]) {
        let dir = layout.dependency_dir(&foo());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(&r.entry.filename), data).unwrap();
    }

    const LINUX: Platform = Platform::new(Os::Linux, Arch::Amd64);
    const DARWIN: Platform = Platform::new(Os::Darwin, Arch::Arm64);

    #[test]
    fn test_json_has_stable_key_order() {
        let mut index = MirrorIndex::new(foo());
        index.insert(
            Version::new(1, 10, 0),
            LINUX,
            IndexEntry::new("b.zip", [hash_of(b"b")]),
        );
        index.insert(
            Version::new(1, 2, 0),
            LINUX,
            IndexEntry::new("a.zip", [hash_of(b"a")]),
        );
        index.insert(
            Version::new(1, 2, 0),
            DARWIN,
            IndexEntry::new("c.zip", [hash_of(b"c")]),
        );

        let json = String::from_utf8(index.to_json().unwrap()).unwrap();
        let v12 = json.find("\"1.2.0\"").unwrap();
        let v110 = json.find("\"1.10.0\"").unwrap();
        assert!(v12 < v110, "versions must be in semver order");
        let darwin = json.find("darwin_arm64").unwrap();
        let linux = json.find("linux_amd64").unwrap();
        assert!(darwin < linux);
        assert!(json.ends_with("}\n"));

        let back: MirrorIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }

    #[tokio::test]
    async fn test_write_index_merges_prior_platforms() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());

        let linux = record("1.2.0", LINUX, b"linux");
        place(&layout, &linux, b"linux");
        let first = write_index(&layout, &foo(), None, std::slice::from_ref(&linux))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let darwin = record("1.2.0", DARWIN, b"darwin");
        place(&layout, &darwin, b"darwin");
        let loaded = MirrorIndex::load(&layout.index_path(&foo()))
            .await
            .unwrap()
            .unwrap();
        let second = write_index(&layout, &foo(), Some(&loaded), std::slice::from_ref(&darwin))
            .await
            .unwrap();

        assert_eq!(second.len(), 2);
        assert!(second.contains(&Version::new(1, 2, 0), &LINUX));
        assert!(second.contains(&Version::new(1, 2, 0), &DARWIN));
    }

    #[tokio::test]
    async fn test_write_index_picks_up_unindexed_packages() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());

        let orphan = record("0.9.0", LINUX, b"orphan");
        place(&layout, &orphan, b"orphan");
        // Staging leftovers are never indexed
        std::fs::write(
            layout.dependency_dir(&foo()).join(format!(".{}", orphan.entry.filename)),
            b"partial",
        )
        .unwrap();

        let index = write_index(&layout, &foo(), None, &[]).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(&Version::new(0, 9, 0), &LINUX),
            Some(&orphan.entry)
        );
    }

    #[tokio::test]
    async fn test_write_index_drops_entries_without_files() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());

        let gone = record("1.0.0", LINUX, b"gone");
        let mut existing = MirrorIndex::new(foo());
        existing.insert(gone.version.clone(), gone.platform, gone.entry.clone());

        let index = write_index(&layout, &foo(), Some(&existing), &[]).await.unwrap();
        assert!(index.is_empty());
        // An index existed before, so the (now empty) index is still written
        assert!(layout.index_path(&foo()).exists());
    }

    #[tokio::test]
    async fn test_nothing_written_for_empty_new_index() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());
        let index = write_index(&layout, &foo(), None, &[]).await.unwrap();
        assert!(index.is_empty());
        assert!(!layout.index_path(&foo()).exists());
        assert!(!layout.dependency_dir(&foo()).exists());
    }

    #[tokio::test]
    async fn test_rewrite_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());
        let linux = record("1.2.0", LINUX, b"linux");
        place(&layout, &linux, b"linux");

        write_index(&layout, &foo(), None, std::slice::from_ref(&linux))
            .await
            .unwrap();
        let first = std::fs::read(layout.index_path(&foo())).unwrap();

        let loaded = MirrorIndex::load(&layout.index_path(&foo())).await.unwrap();
        write_index(&layout, &foo(), loaded.as_ref(), std::slice::from_ref(&linux))
            .await
            .unwrap();
        let second = std::fs::read(layout.index_path(&foo())).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_rejects_newer_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"format_version": 99, "provider": "registry.example.com/ns/foo", "versions": {}}"#,
        )
        .unwrap();
        assert!(MirrorIndex::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_ignores_malformed_index() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        assert_eq!(MirrorIndex::read(&path).await.unwrap(), IndexFile::Missing);

        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            MirrorIndex::read(&path).await.unwrap(),
            IndexFile::Malformed { .. }
        ));
        assert!(MirrorIndex::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_all_walks_layout() {
        let temp = TempDir::new().unwrap();
        let layout = MirrorLayout::new(temp.path());
        let linux = record("1.2.0", LINUX, b"linux");
        place(&layout, &linux, b"linux");

        let rebuilt = rebuild_all(&layout).await.unwrap();
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt[0].provider, foo());
        assert!(layout.index_path(&foo()).exists());
    }
}
