//! Mirror construction.
//!
//! The [`MirrorBuilder`] drives every dependency through resolution, per
//! platform fetching and installation, and finally index writing. Failures
//! that concern a single dependency or platform become [`Diagnostic`]s;
//! only a [`Error::is_fatal`] error ends the run early.

use futures::StreamExt;
use futures::future::join_all;
use semver::Version;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument, warn};

use crate::cache::VersionCache;
use crate::dependency::{Dependency, DependencyId};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ErrorClass;
use crate::fetcher::Fetcher;
use crate::hash::{PackageHash, hash_file, matches_any};
use crate::index::{IndexEntry, IndexFile, MirrorIndex, MirrorRecord, write_index};
use crate::installer::install;
use crate::layout::{MirrorLayout, package_filename};
use crate::platform::Platform;
use crate::registry::RegistryClient;
use crate::resolver::{Resolver, Selection};
use crate::{Error, Result};

/// Default number of dependencies and transfers in flight.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Platforms to mirror, in reporting order.
    pub platforms: Vec<Platform>,
    /// Upper bound on concurrent dependencies and concurrent transfers.
    pub parallelism: usize,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            platforms: Platform::current().into_iter().collect(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Receives each dependency's report once it is complete.
///
/// Reports arrive in declaration order regardless of which dependency
/// finished first.
pub trait Reporter: Send + Sync {
    /// Called once per dependency.
    fn dependency_finished(&self, report: &DependencyReport);
}

impl Reporter for () {
    fn dependency_finished(&self, _report: &DependencyReport) {}
}

/// Terminal state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    /// Built in; nothing was done.
    Skipped,
    /// Version selection failed; no platform was attempted.
    Failed,
    /// Platforms were processed and the index written.
    Indexed,
}

/// What happened for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    /// The package was downloaded and installed.
    Downloaded,
    /// A verified copy was already in the mirror.
    AlreadyPresent,
    /// See the dependency's diagnostics.
    Failed,
}

/// Per-platform result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformOutcome {
    /// Platform.
    pub platform: Platform,
    /// Result.
    pub status: PlatformStatus,
    /// Package path, unless the platform failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Package hash, unless the platform failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<PackageHash>,
}

/// Everything that happened to one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    /// Dependency.
    pub dependency: DependencyId,
    /// Terminal state.
    pub state: DependencyState,
    /// Selected version, when resolution succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Progress lines, in the order they should be shown.
    pub messages: Vec<String>,
    /// Per-platform results, in requested-platform order.
    pub platforms: Vec<PlatformOutcome>,
    /// Problems found.
    pub diagnostics: Diagnostics,
}

impl DependencyReport {
    fn new(dependency: &DependencyId) -> Self {
        Self {
            dependency: dependency.clone(),
            state: DependencyState::Indexed,
            version: None,
            messages: Vec::new(),
            platforms: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Number of packages downloaded for this dependency.
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.platforms
            .iter()
            .filter(|p| p.status == PlatformStatus::Downloaded)
            .count()
    }
}

/// Result of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorOutcome {
    /// One report per dependency, in declaration order.
    pub dependencies: Vec<DependencyReport>,
    /// All diagnostics of all dependencies.
    pub diagnostics: Diagnostics,
}

impl MirrorOutcome {
    /// The run succeeded iff there is no error-severity diagnostic.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    /// Total number of packages downloaded.
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.dependencies.iter().map(DependencyReport::downloads).sum()
    }
}

/// Builds a mirror directory from a registry.
pub struct MirrorBuilder {
    client: Arc<dyn RegistryClient>,
    layout: MirrorLayout,
    cache: VersionCache,
    options: MirrorOptions,
    transfers: Arc<Semaphore>,
}

impl MirrorBuilder {
    /// Create a builder writing to `root`.
    #[must_use]
    pub fn new(
        client: Arc<dyn RegistryClient>,
        root: impl Into<PathBuf>,
        options: MirrorOptions,
    ) -> Self {
        let parallelism = options.parallelism.max(1);
        Self {
            client,
            layout: MirrorLayout::new(root),
            cache: VersionCache::new(),
            options: MirrorOptions {
                parallelism,
                ..options
            },
            transfers: Arc::new(Semaphore::new(parallelism)),
        }
    }

    /// Directory layout being written.
    #[must_use]
    pub const fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Mirror every dependency.
    ///
    /// # Errors
    ///
    /// Only configuration problems (no platforms, unusable target directory)
    /// and a target directory that stops being writable mid-run are returned
    /// as errors. Everything else is reported through
    /// [`MirrorOutcome::diagnostics`].
    #[instrument(skip_all, fields(root = %self.layout.root().display(), dependencies = dependencies.len()))]
    pub async fn run(
        &self,
        dependencies: &[Dependency],
        reporter: &dyn Reporter,
    ) -> Result<MirrorOutcome> {
        if self.options.platforms.is_empty() {
            return Err(Error::configuration_with_help(
                "no target platforms",
                "Pass --platform, or run on a host platform that can be detected",
            ));
        }

        let root = self.layout.root();
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            Error::configuration(format!(
                "cannot create target directory {}: {e}",
                root.display()
            ))
        })?;
        probe_writable(root).map_err(|e| {
            Error::configuration(format!(
                "target directory {} is not writable: {e}",
                root.display()
            ))
        })?;

        info!(
            platforms = self.options.platforms.len(),
            parallelism = self.options.parallelism,
            "Building mirror"
        );

        let mut outcome = MirrorOutcome::default();
        let mut reports = futures::stream::iter(dependencies)
            .map(|dependency| self.mirror_dependency(dependency))
            .buffered(self.options.parallelism);

        while let Some(report) = reports.next().await {
            let report = report?;
            reporter.dependency_finished(&report);
            outcome.diagnostics.extend(report.diagnostics.iter().cloned());
            outcome.dependencies.push(report);
        }

        info!(
            success = outcome.success(),
            downloads = outcome.downloads(),
            "Mirror complete"
        );
        Ok(outcome)
    }

    async fn mirror_dependency(&self, dependency: &Dependency) -> Result<DependencyReport> {
        let id = &dependency.id;
        let mut report = DependencyReport::new(id);

        if dependency.builtin {
            debug!(dependency = %id, "Skipping built-in");
            report.state = DependencyState::Skipped;
            report
                .messages
                .push(format!("- Skipping {id} because it is built in"));
            return Ok(report);
        }

        report.messages.push(format!("- Mirroring {id}..."));

        let resolver = Resolver::new(self.client.as_ref(), &self.cache);
        let selection = match resolver.resolve(id, &dependency.constraints).await {
            Ok(selection) => selection,
            Err(e) => {
                self.recover(id, None, e, &mut report.diagnostics).await?;
                report.state = DependencyState::Failed;
                return Ok(report);
            }
        };
        report.messages.push(selection_message(&selection));
        report.version = Some(selection.version.clone());

        let index_path = self.layout.index_path(id);
        let (existing, index_usable) = match MirrorIndex::read(&index_path).await {
            Ok(IndexFile::Present(index)) => (Some(index), true),
            Ok(IndexFile::Missing) => (None, true),
            Ok(IndexFile::Malformed { reason }) => {
                warn!(dependency = %id, error = %reason, "Ignoring malformed index, rebuilding from disk");
                report
                    .diagnostics
                    .push(Diagnostic::index_ignored(id, &index_path, &reason));
                (None, true)
            }
            Err(e) => {
                warn!(dependency = %id, error = %e, "Existing index cannot be updated");
                self.recover(id, None, e, &mut report.diagnostics).await?;
                (None, false)
            }
        };

        let results = join_all(self.options.platforms.iter().map(|platform| {
            self.mirror_platform(id, &selection.version, *platform, existing.as_ref())
        }))
        .await;

        let mut records = Vec::new();
        for (platform, (messages, result)) in self.options.platforms.iter().zip(results) {
            report.messages.extend(messages);
            match result {
                Ok((status, record)) => {
                    report.platforms.push(PlatformOutcome {
                        platform: *platform,
                        status,
                        path: Some(
                            self.layout
                                .package_path(id, &record.version, &record.platform),
                        ),
                        hash: record.entry.hashes.first().cloned(),
                    });
                    records.push(record);
                }
                Err(e) => {
                    report.platforms.push(PlatformOutcome {
                        platform: *platform,
                        status: PlatformStatus::Failed,
                        path: None,
                        hash: None,
                    });
                    self.recover(id, Some(*platform), e, &mut report.diagnostics)
                        .await?;
                }
            }
        }

        if index_usable
            && let Err(e) = write_index(&self.layout, id, existing.as_ref(), &records).await
        {
            self.recover(id, None, e, &mut report.diagnostics).await?;
        }

        Ok(report)
    }

    /// Mirror one platform, returning its progress lines and result.
    async fn mirror_platform(
        &self,
        id: &DependencyId,
        version: &Version,
        platform: Platform,
        existing: Option<&MirrorIndex>,
    ) -> (Vec<String>, Result<(PlatformStatus, MirrorRecord)>) {
        let mut messages = Vec::new();
        let result = self
            .mirror_platform_inner(id, version, platform, existing, &mut messages)
            .await;
        (messages, result)
    }

    #[instrument(skip(self, existing, messages), fields(dependency = %id, %version, %platform))]
    async fn mirror_platform_inner(
        &self,
        id: &DependencyId,
        version: &Version,
        platform: Platform,
        existing: Option<&MirrorIndex>,
        messages: &mut Vec<String>,
    ) -> Result<(PlatformStatus, MirrorRecord)> {
        let target = self.layout.package_path(id, version, &platform);
        let filename = package_filename(id, version, &platform);
        let record = |hashes: Vec<PackageHash>| MirrorRecord {
            version: version.clone(),
            platform,
            entry: IndexEntry::new(filename.clone(), hashes),
        };

        // Indexed and intact: no registry request at all
        if let Some(entry) = existing.and_then(|index| index.get(version, &platform))
            && let Some(actual) = hash_file(&target).await?
            && entry.records(&actual)
        {
            debug!("Package matches index, skipping");
            messages.push(format!("  - Package for {platform} already present"));
            return Ok((PlatformStatus::AlreadyPresent, record(entry.hashes.clone())));
        }

        let fetcher = Fetcher::new(self.client.as_ref());
        let (_permit, fetched) = match hash_file(&target).await? {
            // Unindexed file on disk: compare against the registry first
            Some(actual) => {
                let located = fetcher.locate(id, version, &platform).await?;
                if matches_any(&actual, &located.meta.hashes) {
                    debug!("Package matches registry checksum, skipping download");
                    messages.push(format!("  - Package for {platform} already present"));
                    return Ok((
                        PlatformStatus::AlreadyPresent,
                        record(verifiable_with(&located.meta.hashes, actual)),
                    ));
                }
                messages.push(format!("  - Downloading package for {platform}..."));
                let permit = self.transfer_permit(&located.url).await?;
                (permit, fetcher.open(located).await?)
            }
            None => {
                messages.push(format!("  - Downloading package for {platform}..."));
                let permit = self.transfer_permit(&filename).await?;
                (permit, fetcher.fetch(id, version, &platform).await?)
            }
        };
        let installed = install(fetched.stream, &fetched.located.meta, &target).await?;

        Ok((
            PlatformStatus::Downloaded,
            record(verifiable_with(&fetched.located.meta.hashes, installed.hash)),
        ))
    }

    async fn transfer_permit(&self, what: &str) -> Result<SemaphorePermit<'_>> {
        self.transfers
            .acquire()
            .await
            .map_err(|_| Error::transfer(what, "transfer pool closed"))
    }

    /// Turn a recoverable error into a diagnostic, or return it if fatal.
    ///
    /// Persistence errors re-check the mirror root: if it can no longer be
    /// written to, the error escalates to [`Error::TargetUnwritable`].
    async fn recover(
        &self,
        id: &DependencyId,
        platform: Option<Platform>,
        err: Error,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        if err.class() == ErrorClass::Persistence {
            let root = self.layout.root().to_path_buf();
            let probe = tokio::task::spawn_blocking(move || probe_writable(&root))
                .await
                .unwrap_or_else(|e| Err(std::io::Error::other(e)));
            if let Err(source) = probe {
                warn!(dependency = %id, error = %err, "Mirror directory is no longer writable");
                return Err(Error::TargetUnwritable {
                    path: self.layout.root().into(),
                    source,
                });
            }
        }
        warn!(dependency = %id, error = %err, "Recording diagnostic");
        let diagnostic = Diagnostic::from_error(id, &err);
        diagnostics.push(match platform {
            Some(platform) => diagnostic.for_platform(platform),
            None => diagnostic,
        });
        Ok(())
    }
}

fn selection_message(selection: &Selection) -> String {
    if selection.is_constrained() {
        format!(
            "  - Selected v{} to meet constraints {}",
            selection.version, selection.constraints
        )
    } else {
        format!("  - Selected v{} with no constraints", selection.version)
    }
}

/// Verifiable registry hashes plus the locally computed one.
fn verifiable_with(expected: &[PackageHash], actual: PackageHash) -> Vec<PackageHash> {
    expected
        .iter()
        .filter(|h| h.is_verifiable())
        .cloned()
        .chain(std::iter::once(actual))
        .collect()
}

/// Create and remove a temporary file in `root`.
fn probe_writable(root: &Path) -> std::io::Result<()> {
    tempfile::Builder::new()
        .prefix(".provider-mirror-probe")
        .tempfile_in(root)?
        .close()
}
