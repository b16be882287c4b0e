//! Mirror manifest (`mirror.toml`).
//!
//! ```toml
//! format_version = 1
//!
//! [mirror]
//! platforms = ["linux_amd64", "darwin_arm64"]
//! parallelism = 4
//! timeout_secs = 300
//!
//! [registries."registry.example.com"]
//! url = "https://registry.example.com/v1/providers/"
//!
//! [providers.foo]
//! source = "registry.example.com/ns/foo"
//! version = ">= 1.0.0, < 2.0.0"
//!
//! [providers.terraform]
//! source = "terraform.io/builtin/terraform"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::constraints::ConstraintSet;
use crate::dependency::{Dependency, DependencyId};
use crate::{Error, Result};

/// Default manifest filename.
pub const MANIFEST_FILENAME: &str = "mirror.toml";

/// Current manifest format version.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Namespace assumed when a provider entry has no `source`.
const DEFAULT_NAMESPACE: &str = "hashicorp";

/// Parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version (for future migrations).
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Run settings.
    #[serde(default)]
    pub mirror: MirrorSettings,
    /// Per-host registry overrides.
    #[serde(default)]
    pub registries: BTreeMap<String, RegistrySettings>,
    /// Declared providers, keyed by local name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,
}

const fn default_format_version() -> u32 {
    MANIFEST_FORMAT_VERSION
}

/// `[mirror]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Target platforms; empty means the host platform.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Concurrency bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    /// Network timeout for registry requests, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// `[registries."<host>"]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Base URL of the providers API on that host.
    pub url: String,
}

/// `[providers.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Source address; defaults to `hashicorp/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Version constraints.
    #[serde(default)]
    pub version: VersionConstraints,
    /// Treat as built in even if the address is not a built-in address.
    #[serde(default)]
    pub builtin: bool,
}

/// A constraint string or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionConstraints {
    /// `version = ">= 1.0"`
    One(String),
    /// `version = [">= 1.0", "< 2.0"]`
    Many(Vec<String>),
}

impl Default for VersionConstraints {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl VersionConstraints {
    fn parse(&self) -> Result<ConstraintSet> {
        match self {
            Self::One(raw) => ConstraintSet::parse(raw),
            Self::Many(raws) => {
                let mut set = ConstraintSet::default();
                for raw in raws {
                    set.extend(ConstraintSet::parse(raw)?);
                }
                Ok(set)
            }
        }
    }
}

impl Manifest {
    /// Load a manifest from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_help(
                format!("Failed to read manifest {}: {e}", path.display()),
                format!("Create a {MANIFEST_FILENAME} or pass --manifest"),
            )
        })?;
        Self::parse(&content)
    }

    /// Parse manifest text.
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse manifest: {e}")))?;

        if manifest.format_version > MANIFEST_FORMAT_VERSION {
            return Err(Error::configuration(format!(
                "Manifest format version {} is newer than supported version {}. Please upgrade provider-mirror.",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }

        Ok(manifest)
    }

    /// Declared dependencies, sorted by address.
    ///
    /// Entries naming the same source are merged: their constraints are
    /// concatenated in entry order and any `builtin` flag wins.
    pub fn dependencies(&self) -> Result<Vec<Dependency>> {
        let mut merged: BTreeMap<DependencyId, Dependency> = BTreeMap::new();

        for (local_name, entry) in &self.providers {
            let id = match &entry.source {
                Some(source) => DependencyId::parse(source)?,
                None => DependencyId::parse(&format!("{DEFAULT_NAMESPACE}/{local_name}"))?,
            };
            let constraints = entry.version.parse().map_err(|e| {
                Error::configuration(format!("Invalid version for provider {local_name:?}: {e}"))
            })?;

            merged
                .entry(id.clone())
                .and_modify(|dep| {
                    dep.constraints.extend(constraints.clone());
                    dep.builtin |= entry.builtin;
                })
                .or_insert_with(|| Dependency::new(id, constraints).with_builtin(entry.builtin));
        }

        Ok(merged.into_values().collect())
    }

    /// Registry URL override for `hostname`, if any.
    #[must_use]
    pub fn registry_url(&self, hostname: &str) -> Option<&str> {
        self.registries
            .get(&hostname.to_lowercase())
            .map(|r| r.url.as_str())
    }
}
