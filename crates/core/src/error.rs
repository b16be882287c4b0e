//! Error types for mirror construction.
//!
//! Every variant belongs to one [`ErrorClass`]. The builder uses the class to
//! decide whether a failure is recorded as a diagnostic against a single
//! dependency or platform, or whether it aborts the whole run.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

use crate::platform::Platform;

/// Broad error categories used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Invalid target directory, platform or manifest. Always fatal.
    Configuration,
    /// Version selection failed for one dependency.
    Resolution,
    /// Metadata lookup or transfer failed for one platform.
    Fetch,
    /// Downloaded bytes did not match the expected checksum.
    Integrity,
    /// Writing staged files, packages or indexes failed.
    Persistence,
}

/// Main error type for mirror operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid input supplied before any network activity.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(provider_mirror::config))]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
        /// Optional hint for fixing it.
        #[help]
        help: Option<String>,
    },

    /// No available version satisfies the constraint set.
    #[error("no releases match the given constraints {constraints}")]
    #[diagnostic(
        code(provider_mirror::resolve::no_match),
        help("Relax the version constraints or check that the release was published")
    )]
    NoMatchingVersion {
        /// Dependency identifier.
        dependency: String,
        /// Constraint set as written in the manifest.
        constraints: String,
    },

    /// The registry could not list versions for a dependency.
    #[error("could not query available versions: {message}")]
    #[diagnostic(code(provider_mirror::resolve::registry))]
    RegistryUnavailable {
        /// Dependency identifier.
        dependency: String,
        /// Underlying registry error.
        message: String,
    },

    /// The selected version has no package for the requested platform.
    #[error("{message}")]
    #[diagnostic(code(provider_mirror::fetch::unavailable))]
    PackageUnavailable {
        /// Dependency identifier.
        dependency: String,
        /// Selected version.
        version: semver::Version,
        /// Requested platform.
        platform: Platform,
        /// Registry explanation.
        message: String,
    },

    /// The registry client handed back a location that is not an HTTP URL.
    #[error("registry client returned unexpected location type {kind}")]
    #[diagnostic(
        code(provider_mirror::fetch::location_kind),
        help("This is a bug in the registry client.")
    )]
    UnsupportedLocationKind {
        /// Dependency identifier.
        dependency: String,
        /// Selected version.
        version: semver::Version,
        /// Requested platform.
        platform: Platform,
        /// Name of the location variant that was returned.
        kind: &'static str,
    },

    /// Streaming package bytes failed or timed out.
    #[error("transfer from {url} failed: {message}")]
    #[diagnostic(
        code(provider_mirror::fetch::transfer),
        help("Re-run the command; packages that were already mirrored are skipped")
    )]
    TransferFailed {
        /// Location being downloaded.
        url: String,
        /// Transport error.
        message: String,
    },

    /// The staged package does not hash to any expected checksum.
    #[error(
        "checksum mismatch for {}: expected {}, got {actual}",
        path.display(),
        if expected.is_empty() { "a verifiable checksum".to_string() } else { expected.join(" or ") }
    )]
    #[diagnostic(code(provider_mirror::integrity))]
    IntegrityMismatch {
        /// Target path the package was destined for.
        path: Box<Path>,
        /// Checksums the registry reported.
        expected: Vec<String>,
        /// Checksum computed over the downloaded bytes.
        actual: String,
    },

    /// I/O failure while writing into the mirror directory.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(provider_mirror::io),
        help("Check file permissions and available disk space")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available.
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "create", "write", "rename").
        operation: String,
    },

    /// The mirror directory itself can no longer be written.
    #[error("target directory {} is not writable", path.display())]
    #[diagnostic(code(provider_mirror::io::target))]
    TargetUnwritable {
        /// The mirror root.
        path: Box<Path>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An index or manifest could not be encoded or decoded.
    #[error("Serialization error in {}: {message}", path.display())]
    #[diagnostic(code(provider_mirror::serialization))]
    Serialization {
        /// File being read or written.
        path: Box<Path>,
        /// Encoder or decoder message.
        message: String,
    },
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text.
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an I/O error with path context.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a transfer error.
    #[must_use]
    pub fn transfer(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransferFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Serialization {
            path: path.as_ref().into(),
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration { .. } => ErrorClass::Configuration,
            Self::NoMatchingVersion { .. } | Self::RegistryUnavailable { .. } => {
                ErrorClass::Resolution
            }
            Self::PackageUnavailable { .. }
            | Self::UnsupportedLocationKind { .. }
            | Self::TransferFailed { .. } => ErrorClass::Fetch,
            Self::IntegrityMismatch { .. } => ErrorClass::Integrity,
            Self::Io { .. } | Self::TargetUnwritable { .. } | Self::Serialization { .. } => {
                ErrorClass::Persistence
            }
        }
    }

    /// Whether the error aborts the whole run instead of a single item.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::TargetUnwritable { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "operation".to_string(),
        }
    }
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};

    #[test]
    fn test_configuration_error() {
        let error = Error::configuration("no output directory");
        assert_eq!(error.to_string(), "Configuration error: no output directory");
        assert_eq!(error.class(), ErrorClass::Configuration);
        assert!(error.is_fatal());
    }

    #[test]
    fn test_no_matching_version_message() {
        let error = Error::NoMatchingVersion {
            dependency: "registry.example.com/ns/foo".into(),
            constraints: ">= 3.0.0".into(),
        };
        assert_eq!(
            error.to_string(),
            "no releases match the given constraints >= 3.0.0"
        );
        assert_eq!(error.class(), ErrorClass::Resolution);
        assert!(!error.is_fatal());

        let error = Error::RegistryUnavailable {
            dependency: "registry.example.com/ns/foo".into(),
            message: "connection refused".into(),
        };
        assert_eq!(error.class(), ErrorClass::Resolution);
    }

    #[test]
    fn test_fetch_errors_are_recoverable() {
        let error = Error::UnsupportedLocationKind {
            dependency: "registry.example.com/ns/foo".into(),
            version: semver::Version::new(1, 2, 0),
            platform: Platform::new(Os::Linux, Arch::Amd64),
            kind: "local archive",
        };
        assert_eq!(error.class(), ErrorClass::Fetch);
        assert!(!error.is_fatal());

        let error = Error::transfer("https://example.com/a.zip", "timed out");
        assert_eq!(error.class(), ErrorClass::Fetch);
        assert!(error.to_string().contains("timed out"));
    }

    #[test]
    fn test_integrity_mismatch_message() {
        let error = Error::IntegrityMismatch {
            path: Path::new("/mirror/a.zip").into(),
            expected: vec!["zh:aaaa".into()],
            actual: "zh:bbbb".into(),
        };
        let msg = error.to_string();
        assert!(msg.contains("/mirror/a.zip"));
        assert!(msg.contains("zh:aaaa"));
        assert!(msg.contains("zh:bbbb"));

        let error = Error::IntegrityMismatch {
            path: Path::new("/mirror/a.zip").into(),
            expected: vec![],
            actual: "zh:bbbb".into(),
        };
        assert!(error.to_string().contains("a verifiable checksum"));
    }

    #[test]
    fn test_io_error_context() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = Error::io(io, "/mirror/index.json", "rename");
        assert_eq!(error.to_string(), "I/O rename failed: /mirror/index.json");
        assert_eq!(error.class(), ErrorClass::Persistence);
        assert!(!error.is_fatal());

        let error: Error = std::io::Error::other("boom").into();
        assert!(matches!(error, Error::Io { path: None, .. }));
    }

    #[test]
    fn test_target_unwritable_is_fatal() {
        let error = Error::TargetUnwritable {
            path: Path::new("/mirror").into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(error.class(), ErrorClass::Persistence);
        assert!(error.is_fatal());
    }
}
