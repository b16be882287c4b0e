//! User-facing diagnostics accumulated during a run.
//!
//! Recoverable errors never abort the builder. They are converted into a
//! [`Diagnostic`] attached to the dependency they concern, and the run
//! fails at the end if any diagnostic has error severity.

use serde::Serialize;
use std::path::Path;

use crate::dependency::DependencyId;
use crate::error::{Error, ErrorClass};
use crate::platform::Platform;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the run fail.
    Error,
    /// Reported, but the run can still succeed.
    Warning,
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Short title.
    pub summary: String,
    /// Full explanation.
    pub detail: String,
    /// Dependency the problem concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<DependencyId>,
    /// Platform the problem concerns, for per-platform failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Diagnostic {
    /// An error-severity diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            dependency: None,
            platform: None,
        }
    }

    /// A warning-severity diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary, detail)
        }
    }

    /// Attach the dependency.
    #[must_use]
    pub fn for_dependency(mut self, dependency: &DependencyId) -> Self {
        self.dependency = Some(dependency.clone());
        self
    }

    /// Attach the platform.
    #[must_use]
    pub const fn for_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// An existing index that could not be parsed and is being rebuilt.
    #[must_use]
    pub fn index_ignored(dependency: &DependencyId, path: &Path, reason: &str) -> Self {
        Self::warning(
            "Mirror index ignored",
            format!(
                "The index at {} could not be read ({reason}). It was rebuilt from the packages on disk.",
                path.display()
            ),
        )
        .for_dependency(dependency)
    }

    /// Describe a recoverable error raised while mirroring `dependency`.
    #[must_use]
    pub fn from_error(dependency: &DependencyId, err: &Error) -> Self {
        let diagnostic = match (err.class(), err) {
            (ErrorClass::Resolution, _) => Self::error(
                "Provider not available",
                format!("Failed to download {dependency} from its origin registry: {err}."),
            ),
            (
                _,
                Error::PackageUnavailable {
                    version, platform, ..
                },
            ) => Self::error(
                "Provider release not available",
                format!("Failed to download {dependency} v{version} for {platform}: {err}."),
            ),
            (
                _,
                Error::UnsupportedLocationKind {
                    version, platform, ..
                },
            ) => Self::error(
                "Provider release not available",
                format!(
                    "Failed to download {dependency} v{version} for {platform}: {err}. \
                     This is a bug in the registry client."
                ),
            ),
            (ErrorClass::Fetch, _) => Self::error(
                "Cannot download provider",
                format!("Failed to download a package of {dependency}: {err}."),
            ),
            (ErrorClass::Integrity, _) => Self::error(
                "Provider package failed verification",
                format!("A package of {dependency} did not match its published checksum: {err}."),
            ),
            (ErrorClass::Persistence | ErrorClass::Configuration, _) => Self::error(
                "Cannot write to mirror directory",
                format!("Failed to write {dependency} into the mirror: {err}."),
            ),
        };
        diagnostic.for_dependency(dependency)
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Append every diagnostic of `other`.
    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.0.extend(other);
    }

    /// Whether any diagnostic has error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use semver::Version;

    fn foo() -> DependencyId {
        DependencyId::new("registry.example.com", "ns", "foo")
    }

    #[test]
    fn test_resolution_wording() {
        let err = Error::NoMatchingVersion {
            dependency: foo().to_string(),
            constraints: ">= 3.0.0".into(),
        };
        let diag = Diagnostic::from_error(&foo(), &err);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.summary, "Provider not available");
        assert_eq!(
            diag.detail,
            "Failed to download registry.example.com/ns/foo from its origin registry: \
             no releases match the given constraints >= 3.0.0."
        );
        assert_eq!(diag.dependency, Some(foo()));
        assert_eq!(diag.platform, None);
    }

    #[test]
    fn test_package_unavailable_wording() {
        let err = Error::PackageUnavailable {
            dependency: foo().to_string(),
            version: Version::new(1, 2, 0),
            platform: Platform::new(Os::Windows, Arch::Arm64),
            message: "provider not published for windows_arm64".into(),
        };
        let diag = Diagnostic::from_error(&foo(), &err);
        assert_eq!(diag.summary, "Provider release not available");
        assert!(diag.detail.starts_with(
            "Failed to download registry.example.com/ns/foo v1.2.0 for windows_arm64:"
        ));
    }

    #[test]
    fn test_unsupported_location_mentions_bug() {
        let err = Error::UnsupportedLocationKind {
            dependency: foo().to_string(),
            version: Version::new(1, 2, 0),
            platform: Platform::new(Os::Linux, Arch::Amd64),
            kind: "local archive",
        };
        let diag = Diagnostic::from_error(&foo(), &err);
        assert!(diag.detail.contains("This is a bug"));
    }

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.push(Diagnostic::index_ignored(
            &foo(),
            Path::new("/srv/mirror/index.json"),
            "expected value at line 1 column 1",
        ));
        assert!(!diags.has_errors());
        diags.push(Diagnostic::error("Boom", "detail"));
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_index_ignored_is_warning() {
        let diag = Diagnostic::index_ignored(&foo(), Path::new("/srv/mirror/index.json"), "eof");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.summary, "Mirror index ignored");
        assert!(diag.detail.contains("/srv/mirror/index.json"));
        assert_eq!(diag.dependency, Some(foo()));
    }

    #[test]
    fn test_serializes_without_empty_fields() {
        let diag = Diagnostic::error("Boom", "detail");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "error");
        assert!(json.get("dependency").is_none());
        assert!(json.get("platform").is_none());
    }
}
