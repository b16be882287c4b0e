//! Target platform identification.
//!
//! Platforms are written `os_arch` (e.g. `linux_amd64`, `darwin_arm64`), the
//! form used in package filenames and index keys. Parsing also accepts the
//! hyphenated `os-arch` spelling and common aliases (`macos`, `x86_64`,
//! `aarch64`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this process is running on.
    ///
    /// Returns `None` on hosts with no provider builds.
    #[must_use]
    pub fn current() -> Option<Self> {
        Some(Self {
            os: Os::parse(std::env::consts::OS)?,
            arch: Arch::parse(std::env::consts::ARCH)?,
        })
    }

    /// Parse from a string like `linux_amd64` or `darwin-arm64`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        // `x86_64` contains an underscore, so fall back to the hyphen split
        ['_', '-'].iter().find_map(|sep| {
            let (os, arch) = s.split_once(*sep)?;
            Some(Self {
                os: Os::parse(os)?,
                arch: Arch::parse(arch)?,
            })
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            Error::configuration_with_help(
                format!("The string {s:?} is not a valid target platform"),
                "Target names consist of an operating system and a CPU architecture, e.g. \"linux_amd64\"",
            )
        })
    }
}

impl TryFrom<String> for Platform {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Darwin,
    FreeBsd,
    Linux,
    OpenBsd,
    Solaris,
    Windows,
}

impl Os {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "darwin" | "macos" => Some(Self::Darwin),
            "freebsd" => Some(Self::FreeBsd),
            "linux" => Some(Self::Linux),
            "openbsd" => Some(Self::OpenBsd),
            "solaris" => Some(Self::Solaris),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Darwin => "darwin",
            Self::FreeBsd => "freebsd",
            Self::Linux => "linux",
            Self::OpenBsd => "openbsd",
            Self::Solaris => "solaris",
            Self::Windows => "windows",
        })
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    Amd64,
    Arm,
    Arm64,
    X86,
}

impl Arch {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" | "x64" => Some(Self::Amd64),
            "arm" => Some(Self::Arm),
            "arm64" | "aarch64" => Some(Self::Arm64),
            "386" | "x86" | "i386" => Some(Self::X86),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Amd64 => "amd64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::X86 => "386",
        })
    }
}

/// Parse every requested platform, collecting all invalid entries.
///
/// An empty request falls back to the host platform.
pub fn parse_platforms<S: AsRef<str>>(requested: &[S]) -> Result<Vec<Platform>> {
    if requested.is_empty() {
        return Platform::current().map(|p| vec![p]).ok_or_else(|| {
            Error::configuration_with_help(
                format!(
                    "The host platform {}_{} is not a supported target",
                    std::env::consts::OS,
                    std::env::consts::ARCH
                ),
                "Pass --platform explicitly",
            )
        });
    }

    let mut platforms = Vec::with_capacity(requested.len());
    let mut invalid = Vec::new();
    for raw in requested {
        let raw = raw.as_ref();
        match Platform::parse(raw) {
            Some(p) if !platforms.contains(&p) => platforms.push(p),
            Some(_) => {}
            None => invalid.push(format!("{raw:?}")),
        }
    }

    if invalid.is_empty() {
        Ok(platforms)
    } else {
        Err(Error::configuration_with_help(
            format!("Invalid target platform: {}", invalid.join(", ")),
            "Target names consist of an operating system and a CPU architecture, e.g. \"linux_amd64\"",
        ))
    }
}
