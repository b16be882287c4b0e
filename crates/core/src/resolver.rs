//! Version selection.

use semver::Version;
use tracing::{info, instrument};

use crate::cache::VersionCache;
use crate::constraints::ConstraintSet;
use crate::dependency::DependencyId;
use crate::registry::RegistryClient;
use crate::{Error, Result};

/// The version chosen for one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Highest acceptable version.
    pub version: Version,
    /// Constraint text, empty when the selection was unconstrained.
    pub constraints: String,
}

impl Selection {
    /// Whether any constraint took part in the choice.
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        !self.constraints.is_empty()
    }
}

/// Picks the newest version satisfying a constraint set.
pub struct Resolver<'a> {
    client: &'a dyn RegistryClient,
    cache: &'a VersionCache,
}

impl<'a> Resolver<'a> {
    /// Create a resolver that queries `client` through `cache`.
    #[must_use]
    pub fn new(client: &'a dyn RegistryClient, cache: &'a VersionCache) -> Self {
        Self { client, cache }
    }

    /// Select the maximum available version allowed by `constraints`.
    ///
    /// # Errors
    ///
    /// [`Error::RegistryUnavailable`] when the version query fails, and
    /// [`Error::NoMatchingVersion`] when nothing qualifies.
    #[instrument(skip(self, constraints), fields(%dependency, constraints = %constraints))]
    pub async fn resolve(
        &self,
        dependency: &DependencyId,
        constraints: &ConstraintSet,
    ) -> Result<Selection> {
        let available = self
            .cache
            .versions(self.client, dependency)
            .await
            .map_err(|e| Error::RegistryUnavailable {
                dependency: dependency.to_string(),
                message: e.to_string(),
            })?;

        let selected = constraints
            .newest(available.iter())
            .ok_or_else(|| Error::NoMatchingVersion {
                dependency: dependency.to_string(),
                constraints: if constraints.is_empty() {
                    "(none)".to_string()
                } else {
                    constraints.to_string()
                },
            })?;

        info!(%dependency, version = %selected, "Selected version");

        Ok(Selection {
            version: selected.clone(),
            constraints: constraints.to_string(),
        })
    }
}
