//! Per-run memoization of version listings.
//!
//! A [`VersionCache`] lives for exactly one mirror run. Each dependency is
//! queried at most once; later callers (including concurrent ones) wait on
//! the first query and share its result, failures included.

use semver::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::dependency::DependencyId;
use crate::registry::{RegistryClient, RegistryError};

/// Parsed version list shared between callers.
pub type VersionList = Arc<[Version]>;

type Slot = Arc<OnceCell<Result<VersionList, RegistryError>>>;

/// Write-once-per-key cache of available versions.
#[derive(Debug, Default)]
pub struct VersionCache {
    slots: Mutex<HashMap<DependencyId, Slot>>,
}

impl VersionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached list for `dependency`, querying `client` on first use.
    pub async fn versions(
        &self,
        client: &dyn RegistryClient,
        dependency: &DependencyId,
    ) -> Result<VersionList, RegistryError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(dependency.clone()).or_default())
        };

        if slot.initialized() {
            debug!(%dependency, "Version list cache hit");
        }

        slot.get_or_init(|| async {
            debug!(%dependency, "Querying available versions");
            client
                .available_versions(dependency)
                .await
                .map(|raw| parse_versions(dependency, &raw))
        })
        .await
        .clone()
    }

    /// Number of dependencies queried so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been queried yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_versions(dependency: &DependencyId, raw: &[String]) -> VersionList {
    raw.iter()
        .filter_map(|s| {
            let trimmed = s.trim();
            let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
            match Version::parse(trimmed) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(%dependency, version = %s, error = %e, "Ignoring unparseable version");
                    None
                }
            }
        })
        .collect()
}
