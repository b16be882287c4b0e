//! Provider mirror construction.
//!
//! Given declared provider dependencies (each with version constraints) and
//! a set of target platforms, this crate resolves the newest acceptable
//! version of every dependency from an upstream registry, downloads the
//! platform packages, verifies them, and lays them out as a static mirror:
//!
//! ```text
//! <root>/<hostname>/<namespace>/<name>/
//!     index.json
//!     terraform-provider-<name>_<version>_<os>_<arch>.zip
//! ```
//!
//! # Overview
//!
//! - [`Resolver`] picks one version per dependency, memoizing registry
//!   listings in a per-run [`VersionCache`].
//! - [`Fetcher`] locates and opens package downloads.
//! - [`install`] streams bytes through a [`StagedFile`] and only promotes
//!   them to their final path once the checksum matches.
//! - [`write_index`] maintains the per-dependency `index.json`.
//! - [`MirrorBuilder`] drives all of the above, turning recoverable
//!   failures into [`Diagnostic`]s.
//!
//! The registry itself is abstracted behind [`RegistryClient`].

pub mod builder;
pub mod cache;
pub mod constraints;
pub mod dependency;
pub mod diagnostics;
pub mod error;
pub mod fetcher;
pub mod hash;
pub mod index;
pub mod installer;
pub mod layout;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod resolver;
pub mod staged;

pub use builder::{
    DEFAULT_PARALLELISM, DependencyReport, DependencyState, MirrorBuilder, MirrorOptions,
    MirrorOutcome, PlatformOutcome, PlatformStatus, Reporter,
};
pub use cache::VersionCache;
pub use constraints::{Constraint, ConstraintSet};
pub use dependency::{Dependency, DependencyId};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{Error, ErrorClass, Result};
pub use fetcher::{FetchedPackage, Fetcher, LocatedPackage};
pub use hash::{PackageHash, ZipHasher};
pub use index::{IndexEntry, IndexFile, MirrorIndex, MirrorRecord, rebuild_all, write_index};
pub use installer::{InstalledPackage, install};
pub use layout::MirrorLayout;
pub use manifest::{MANIFEST_FILENAME, Manifest};
pub use platform::{Arch, Os, Platform, parse_platforms};
pub use registry::{ByteStream, PackageLocation, PackageMeta, RegistryClient, RegistryError};
pub use resolver::{Resolver, Selection};
pub use staged::{StagedFile, write_atomic};
