//! Mirror directory naming convention.
//!
//! ```text
//! <root>/
//! └── <hostname>/<namespace>/<name>/
//!     ├── index.json
//!     ├── terraform-provider-<name>_<version>_<os>_<arch>.zip
//!     └── .terraform-provider-<name>_<version>_<os>_<arch>.zip   (staging, transient)
//! ```

use semver::Version;
use std::path::{Path, PathBuf};

use crate::dependency::DependencyId;
use crate::platform::Platform;
use crate::staged::STAGING_PREFIX;

/// Filename prefix shared by every package archive.
pub const PACKAGE_PREFIX: &str = "terraform-provider-";

/// Per-dependency index filename.
pub const INDEX_FILENAME: &str = "index.json";

const PACKAGE_SUFFIX: &str = ".zip";

/// Path computations for one mirror root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    /// Create a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The mirror root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every package of `dependency`.
    #[must_use]
    pub fn dependency_dir(&self, dependency: &DependencyId) -> PathBuf {
        self.root
            .join(&dependency.hostname)
            .join(&dependency.namespace)
            .join(&dependency.name)
    }

    /// Where the package for the triple is placed.
    #[must_use]
    pub fn package_path(
        &self,
        dependency: &DependencyId,
        version: &Version,
        platform: &Platform,
    ) -> PathBuf {
        self.dependency_dir(dependency)
            .join(package_filename(dependency, version, platform))
    }

    /// Where the index of `dependency` is written.
    #[must_use]
    pub fn index_path(&self, dependency: &DependencyId) -> PathBuf {
        self.dependency_dir(dependency).join(INDEX_FILENAME)
    }
}

/// Deterministic package filename for a triple.
#[must_use]
pub fn package_filename(dependency: &DependencyId, version: &Version, platform: &Platform) -> String {
    format!(
        "{PACKAGE_PREFIX}{}_{}_{}{PACKAGE_SUFFIX}",
        dependency.name, version, platform
    )
}

/// Recover (version, platform) from a package filename of `dependency`.
///
/// Staging files and anything not following the convention yield `None`.
#[must_use]
pub fn parse_package_filename(
    dependency: &DependencyId,
    filename: &str,
) -> Option<(Version, Platform)> {
    if filename.starts_with(STAGING_PREFIX) {
        return None;
    }
    let rest = filename
        .strip_prefix(PACKAGE_PREFIX)?
        .strip_prefix(dependency.name.as_str())?
        .strip_prefix('_')?
        .strip_suffix(PACKAGE_SUFFIX)?;

    let mut parts = rest.rsplitn(3, '_');
    let arch = parts.next()?;
    let os = parts.next()?;
    let version = parts.next()?;

    let platform = Platform::parse(&format!("{os}_{arch}"))?;
    let version = Version::parse(version).ok()?;

    // Only the canonical spelling counts as a mirror entry
    (package_filename(dependency, &version, &platform) == filename).then_some((version, platform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    fn foo() -> DependencyId {
        DependencyId::new("registry.example.com", "ns", "foo")
    }

    #[test]
    fn test_paths() {
        let layout = MirrorLayout::new("/mirror");
        let platform = Platform::new(Os::Linux, Arch::Amd64);
        let version = Version::new(1, 2, 0);

        assert_eq!(
            layout.dependency_dir(&foo()),
            PathBuf::from("/mirror/registry.example.com/ns/foo")
        );
        assert_eq!(
            layout.package_path(&foo(), &version, &platform),
            PathBuf::from(
                "/mirror/registry.example.com/ns/foo/terraform-provider-foo_1.2.0_linux_amd64.zip"
            )
        );
        assert_eq!(
            layout.index_path(&foo()),
            PathBuf::from("/mirror/registry.example.com/ns/foo/index.json")
        );
    }

    #[test]
    fn test_parse_package_filename() {
        let parsed =
            parse_package_filename(&foo(), "terraform-provider-foo_1.2.0_darwin_arm64.zip");
        assert_eq!(
            parsed,
            Some((Version::new(1, 2, 0), Platform::new(Os::Darwin, Arch::Arm64)))
        );

        let parsed =
            parse_package_filename(&foo(), "terraform-provider-foo_2.0.0-beta1_windows_386.zip");
        assert_eq!(
            parsed.map(|(v, _)| v.to_string()),
            Some("2.0.0-beta1".to_string())
        );
    }

    #[test]
    fn test_staging_and_foreign_files_are_ignored() {
        let id = foo();
        assert!(parse_package_filename(&id, ".terraform-provider-foo_1.2.0_linux_amd64.zip").is_none());
        assert!(parse_package_filename(&id, "terraform-provider-bar_1.2.0_linux_amd64.zip").is_none());
        assert!(parse_package_filename(&id, "terraform-provider-foo_1.2.0_linux_amd64.tar.gz").is_none());
        assert!(parse_package_filename(&id, "terraform-provider-foo_banana_linux_amd64.zip").is_none());
        assert!(parse_package_filename(&id, "terraform-provider-foo_1.2.0_linux_x86_64.zip").is_none());
        assert!(parse_package_filename(&id, INDEX_FILENAME).is_none());
    }

    #[test]
    fn test_name_prefix_collision() {
        // "foo" must not claim packages of "foo_bar"
        let id = foo();
        assert!(
            parse_package_filename(&id, "terraform-provider-foo_bar_1.0.0_linux_amd64.zip")
                .is_none()
        );
    }
}
