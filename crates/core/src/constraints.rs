//! Version constraint parsing and matching.
//!
//! A [`ConstraintSet`] is an ordered list of predicates, all of which must
//! hold for a version to be acceptable. Supported forms:
//!
//! | Form            | Meaning                                   |
//! |-----------------|-------------------------------------------|
//! | `1.2.3`, `= 1.2.3` | exactly that version                   |
//! | `!= 1.2.3`      | anything but that version                 |
//! | `> 1.2`, `>= 1.2`, `< 2`, `<= 2.1` | ordered comparison     |
//! | `~> 1.2`        | `>= 1.2.0, < 2.0.0`                       |
//! | `~> 1.2.3`      | `>= 1.2.3, < 1.3.0`                       |
//! | `1.*`, `1.2.x`  | wildcard minor/patch                      |
//!
//! Missing components default to zero. Pre-release versions are only
//! accepted when some `=` constraint names them exactly.

use semver::{Prerelease, Version};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Exact(Version),
    NotEqual(Version),
    Greater(Version),
    AtLeast(Version),
    Less(Version),
    AtMost(Version),
    Pessimistic { lower: Version, upper: Version },
    Wildcard { major: Option<u64>, minor: Option<u64> },
}

impl Predicate {
    fn matches(&self, v: &Version) -> bool {
        match self {
            Self::Exact(x) => v == x,
            Self::NotEqual(x) => v != x,
            Self::Greater(x) => v > x,
            Self::AtLeast(x) => v >= x,
            Self::Less(x) => v < x,
            Self::AtMost(x) => v <= x,
            Self::Pessimistic { lower, upper } => v >= lower && v < upper,
            Self::Wildcard { major, minor } => {
                major.is_none_or(|m| v.major == m) && minor.is_none_or(|m| v.minor == m)
            }
        }
    }
}

/// A single version predicate, keeping its normalized text for messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    predicate: Predicate,
    text: String,
}

impl Constraint {
    /// Parse one predicate such as `>= 1.0.0` or `~> 2.1`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (op, rest) = split_operator(raw);
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(invalid(raw, "missing version"));
        }

        let spec = VersionSpec::parse(rest).map_err(|reason| invalid(raw, &reason))?;

        let predicate = match (op, spec) {
            ("" | "=", VersionSpec::Wildcard { major, minor }) => {
                Predicate::Wildcard { major, minor }
            }
            (_, VersionSpec::Wildcard { .. }) => {
                return Err(invalid(raw, "wildcards can only be used with \"=\""));
            }
            ("" | "=", VersionSpec::Exact { version, .. }) => Predicate::Exact(version),
            ("!=", VersionSpec::Exact { version, .. }) => Predicate::NotEqual(version),
            (">", VersionSpec::Exact { version, .. }) => Predicate::Greater(version),
            (">=", VersionSpec::Exact { version, .. }) => Predicate::AtLeast(version),
            ("<", VersionSpec::Exact { version, .. }) => Predicate::Less(version),
            ("<=", VersionSpec::Exact { version, .. }) => Predicate::AtMost(version),
            ("~>", VersionSpec::Exact { version, precision }) => {
                let upper = match precision {
                    1 | 2 => version
                        .major
                        .checked_add(1)
                        .map(|major| Version::new(major, 0, 0)),
                    _ => version
                        .minor
                        .checked_add(1)
                        .map(|minor| Version::new(version.major, minor, 0)),
                }
                .ok_or_else(|| invalid(raw, "version component too large"))?;
                Predicate::Pessimistic {
                    lower: version,
                    upper,
                }
            }
            (other, _) => return Err(invalid(raw, &format!("unknown operator {other:?}"))),
        };

        let text = if op.is_empty() {
            rest.to_string()
        } else {
            format!("{op} {rest}")
        };

        Ok(Self { predicate, text })
    }

    /// Whether `version` satisfies this predicate on its own.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.predicate.matches(version)
    }

    fn pins(&self, version: &Version) -> bool {
        matches!(&self.predicate, Predicate::Exact(x) if x == version)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::configuration_with_help(
        format!("Invalid version constraint {raw:?}: {reason}"),
        "Constraints look like \">= 1.0.0, < 2.0.0\", \"~> 1.2\" or \"1.2.*\"",
    )
}

fn split_operator(raw: &str) -> (&str, &str) {
    for op in ["~>", ">=", "<=", "!=", "=", ">", "<"] {
        if let Some(rest) = raw.strip_prefix(op) {
            return (op, rest);
        }
    }
    ("", raw)
}

enum VersionSpec {
    Exact { version: Version, precision: usize },
    Wildcard { major: Option<u64>, minor: Option<u64> },
}

impl VersionSpec {
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let text = text.strip_prefix('v').unwrap_or(text);

        // Anything with a pre-release or build suffix must be a full version
        if text.contains(['-', '+']) {
            return Version::parse(text)
                .map(|version| Self::Exact {
                    version,
                    precision: 3,
                })
                .map_err(|e| e.to_string());
        }

        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() > 3 {
            return Err("too many version components".to_string());
        }

        let mut numbers = Vec::with_capacity(3);
        let mut wildcard = false;
        for part in &parts {
            if matches!(*part, "*" | "x" | "X") {
                wildcard = true;
            } else if wildcard {
                return Err("numeric component after a wildcard".to_string());
            } else {
                numbers.push(
                    part.parse::<u64>()
                        .map_err(|_| format!("{part:?} is not a number"))?,
                );
            }
        }

        if wildcard {
            return Ok(Self::Wildcard {
                major: numbers.first().copied(),
                minor: numbers.get(1).copied(),
            });
        }

        let precision = numbers.len();
        numbers.resize(3, 0);
        Ok(Self::Exact {
            version: Version {
                major: numbers[0],
                minor: numbers[1],
                patch: numbers[2],
                pre: Prerelease::EMPTY,
                build: semver::BuildMetadata::EMPTY,
            },
            precision,
        })
    }
}

/// Ordered sequence of predicates that must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// Parse a comma-separated constraint string. Blank input is the empty set.
    pub fn parse(raw: &str) -> Result<Self> {
        let constraints = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Constraint::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { constraints })
    }

    /// Append another set, keeping declaration order.
    pub fn extend(&mut self, other: Self) {
        self.constraints.extend(other.constraints);
    }

    /// Whether no predicate was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Iterate over the predicates in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Whether `version` satisfies every predicate.
    #[must_use]
    pub fn allows(&self, version: &Version) -> bool {
        if self.is_empty() {
            return true;
        }
        if !version.pre.is_empty() && !self.constraints.iter().any(|c| c.pins(version)) {
            return false;
        }
        self.constraints.iter().all(|c| c.matches(version))
    }

    /// The highest version in `available` that satisfies the set.
    #[must_use]
    pub fn newest<'a, I>(&self, available: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        available.into_iter().filter(|v| self.allows(v)).max()
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.constraints.iter().map(|c| c.text.as_str()).collect();
        f.write_str(&parts.join(", "))
    }
}

impl FromStr for ConstraintSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
