//! Subcommand implementations.

use provider_mirror_core::{
    DEFAULT_PARALLELISM, Manifest, MirrorBuilder, MirrorLayout, MirrorOptions, Reporter,
    parse_platforms, rebuild_all,
};
use provider_mirror_registry::{DEFAULT_TIMEOUT, HttpRegistryClient, RegistryEndpoints};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::cli::{CliError, EXIT_MIRROR, EXIT_OK, MirrorArgs, OkEnvelope};
use crate::reporter::{QuietReporter, TextReporter};

/// Settings for one mirror run after merging flags over the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    /// Builder options.
    pub options: MirrorOptions,
    /// Registry request timeout.
    pub timeout: Duration,
}

impl MirrorSettings {
    /// Command-line flags win over manifest values, which win over defaults.
    pub fn resolve(args: &MirrorArgs, manifest: &Manifest) -> Result<Self, CliError> {
        let requested = if args.platforms.is_empty() {
            &manifest.mirror.platforms
        } else {
            &args.platforms
        };
        let platforms = parse_platforms(requested)?;

        let parallelism = args
            .parallelism
            .or(manifest.mirror.parallelism)
            .unwrap_or(DEFAULT_PARALLELISM);
        if parallelism == 0 {
            return Err(CliError::config_with_help(
                "parallelism must be at least 1",
                "Pass --parallelism 1 to process one dependency at a time",
            ));
        }

        let timeout = args
            .timeout_secs
            .or(manifest.mirror.timeout_secs)
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        Ok(Self {
            options: MirrorOptions {
                platforms,
                parallelism,
            },
            timeout,
        })
    }
}

/// Registry endpoints declared in the manifest.
pub fn endpoints(manifest: &Manifest) -> Result<RegistryEndpoints, CliError> {
    manifest
        .registries
        .iter()
        .try_fold(RegistryEndpoints::new(), |endpoints, (host, registry)| {
            endpoints.with_override(host, &registry.url)
        })
        .map_err(CliError::from)
}

/// `provider-mirror mirror`: returns the process exit code.
#[instrument(skip_all, fields(target = %args.target_dir.display()))]
pub async fn mirror(args: &MirrorArgs, json: bool) -> Result<i32, CliError> {
    let manifest = Manifest::load(&args.manifest)?;
    let settings = MirrorSettings::resolve(args, &manifest)?;
    let dependencies = manifest.dependencies()?;
    let client = HttpRegistryClient::new(endpoints(&manifest)?, settings.timeout)?;

    info!(
        manifest = %args.manifest.display(),
        dependencies = dependencies.len(),
        "Starting mirror"
    );

    let builder = MirrorBuilder::new(Arc::new(client), &args.target_dir, settings.options);
    let reporter: &dyn Reporter = if json { &QuietReporter } else { &TextReporter };
    let outcome = builder.run(&dependencies, reporter).await?;

    let code = if outcome.success() { EXIT_OK } else { EXIT_MIRROR };
    if json {
        let envelope = if outcome.success() {
            OkEnvelope::new(&outcome)
        } else {
            OkEnvelope::failed(&outcome)
        };
        write_json(&envelope)?;
    }
    Ok(code)
}

/// Summary of one rebuilt index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    /// Dependency address.
    pub provider: String,
    /// Packages listed.
    pub packages: usize,
}

/// `provider-mirror index`: returns the process exit code.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn index(dir: &Path, json: bool) -> Result<i32, CliError> {
    if !dir.is_dir() {
        return Err(CliError::config(format!(
            "{} is not a mirror directory",
            dir.display()
        )));
    }

    let rebuilt = rebuild_all(&MirrorLayout::new(dir)).await?;
    let summaries: Vec<IndexSummary> = rebuilt
        .iter()
        .map(|index| IndexSummary {
            provider: index.provider.to_string(),
            packages: index.len(),
        })
        .collect();

    if json {
        write_json(&OkEnvelope::new(&summaries))?;
    } else {
        let mut stdout = io::stdout().lock();
        for summary in &summaries {
            writeln!(
                stdout,
                "- Indexed {} ({} packages)",
                summary.provider, summary.packages
            )
            .map_err(|e| CliError::other(format!("Failed to write output: {e}")))?;
        }
    }
    Ok(EXIT_OK)
}

fn write_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))?;
    writeln!(io::stdout().lock(), "{json}")
        .map_err(|e| CliError::other(format!("Failed to write output: {e}")))
}
