//! Dependency identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constraints::ConstraintSet;
use crate::{Error, Result};

/// Registry host used when a source address omits it.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// Host of the pseudo-registry that holds built-in providers.
pub const BUILTIN_HOST: &str = "terraform.io";

/// Namespace of built-in providers under [`BUILTIN_HOST`].
pub const BUILTIN_NAMESPACE: &str = "builtin";

/// Fully qualified dependency address: `hostname/namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DependencyId {
    /// Registry hostname, lowercased.
    pub hostname: String,
    /// Publishing namespace.
    pub namespace: String,
    /// Short name (the provider type).
    pub name: String,
}

impl DependencyId {
    /// Create an id from its three parts.
    #[must_use]
    pub fn new(
        hostname: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into().to_lowercase(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name` or `hostname/namespace/name`.
    pub fn parse(source: &str) -> Result<Self> {
        let parts: Vec<&str> = source.trim().split('/').collect();
        let (hostname, namespace, name) = match parts.as_slice() {
            [namespace, name] => (DEFAULT_REGISTRY_HOST, *namespace, *name),
            [hostname, namespace, name] => (*hostname, *namespace, *name),
            _ => {
                return Err(Error::configuration_with_help(
                    format!("Invalid provider source address {source:?}"),
                    "Use the form \"hostname/namespace/name\" or \"namespace/name\"",
                ));
            }
        };

        for (label, part) in [("hostname", hostname), ("namespace", namespace), ("name", name)] {
            if !is_valid_part(part, label == "hostname") {
                return Err(Error::configuration(format!(
                    "Invalid {label} {part:?} in provider source address {source:?}"
                )));
            }
        }

        Ok(Self::new(hostname, namespace, name))
    }

    /// Whether this id names a provider compiled into the consuming tool.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.hostname == BUILTIN_HOST && self.namespace == BUILTIN_NAMESPACE
    }
}

fn is_valid_part(part: &str, hostname: bool) -> bool {
    !part.is_empty()
        && !part.starts_with(['-', '.'])
        && part.chars().all(|c| {
            c.is_ascii_alphanumeric() || c == '-' || c == '_' || (hostname && (c == '.' || c == ':'))
        })
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.name)
    }
}

impl FromStr for DependencyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DependencyId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DependencyId> for String {
    fn from(id: DependencyId) -> Self {
        id.to_string()
    }
}

/// A declared dependency together with its version constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Registry address.
    pub id: DependencyId,
    /// Built-ins are never resolved, fetched or indexed.
    pub builtin: bool,
    /// Acceptable versions.
    pub constraints: ConstraintSet,
}

impl Dependency {
    /// Create a dependency; the built-in flag follows the address.
    #[must_use]
    pub fn new(id: DependencyId, constraints: ConstraintSet) -> Self {
        let builtin = id.is_builtin();
        Self {
            id,
            builtin,
            constraints,
        }
    }

    /// Mark the dependency as built-in regardless of its address.
    #[must_use]
    pub fn with_builtin(mut self, builtin: bool) -> Self {
        self.builtin = self.builtin || builtin;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let id = DependencyId::parse("Registry.Example.com/ns/foo").unwrap();
        assert_eq!(id.hostname, "registry.example.com");
        assert_eq!(id.namespace, "ns");
        assert_eq!(id.name, "foo");
        assert_eq!(id.to_string(), "registry.example.com/ns/foo");
    }

    #[test]
    fn test_parse_short_address_uses_default_host() {
        let id = DependencyId::parse("hashicorp/random").unwrap();
        assert_eq!(id.hostname, DEFAULT_REGISTRY_HOST);
        assert_eq!(id.to_string(), "registry.terraform.io/hashicorp/random");
    }

    #[test]
    fn test_parse_host_with_port() {
        let id = DependencyId::parse("localhost:8443/ns/foo").unwrap();
        assert_eq!(id.hostname, "localhost:8443");
    }

    #[test]
    fn test_parse_invalid_addresses() {
        assert!(DependencyId::parse("foo").is_err());
        assert!(DependencyId::parse("a/b/c/d").is_err());
        assert!(DependencyId::parse("ns/").is_err());
        assert!(DependencyId::parse("host/ns/fo o").is_err());
        assert!(DependencyId::parse("host/n.s/foo").is_err());
    }

    #[test]
    fn test_builtin_detection() {
        let id = DependencyId::parse("terraform.io/builtin/terraform").unwrap();
        assert!(id.is_builtin());
        let dep = Dependency::new(id, ConstraintSet::default());
        assert!(dep.builtin);

        let id = DependencyId::parse("hashicorp/terraform").unwrap();
        assert!(!id.is_builtin());
        let dep = Dependency::new(id, ConstraintSet::default()).with_builtin(true);
        assert!(dep.builtin);
    }

    #[test]
    fn test_ordering_is_by_address() {
        let mut ids = vec![
            DependencyId::parse("registry.example.com/ns/zeta").unwrap(),
            DependencyId::parse("registry.example.com/ns/alpha").unwrap(),
        ];
        ids.sort();
        assert_eq!(ids[0].name, "alpha");
    }
}
