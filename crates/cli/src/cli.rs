//! Command-line interface definition, error mapping and output envelopes.

use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// The run finished but reported error diagnostics
pub const EXIT_MIRROR: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(provider_mirror::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The mirror could not be completed (exit code 1)
    #[error("Mirror error: {message}")]
    #[diagnostic(code(provider_mirror::cli::mirror))]
    Mirror {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 1)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(provider_mirror::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new mirror error
    #[must_use]
    pub fn mirror(message: impl Into<String>) -> Self {
        Self::Mirror {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

/// Convert `provider_mirror_core::Error` to the matching `CliError` variant.
///
/// - Configuration errors -> Config (exit code 2)
/// - An unwritable target directory -> Mirror, with a hint
/// - Everything else -> Mirror (exit code 1)
impl From<provider_mirror_core::Error> for CliError {
    fn from(err: provider_mirror_core::Error) -> Self {
        use provider_mirror_core::Error;

        match err {
            // Extract just the message to avoid "Configuration error: Configuration error:"
            Error::Configuration { message, help } => Self::Config { message, help },
            Error::TargetUnwritable { .. } => Self::Mirror {
                message: err.to_string(),
                help: Some(
                    "Packages mirrored before the failure are complete; re-run once the directory is writable"
                        .to_string(),
                ),
            },
            other => Self::mirror(other.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Mirror { .. } | CliError::Other { .. } => EXIT_MIRROR,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Mirror { .. } => "mirror",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator: "ok" on success, "failed" when diagnostics have errors
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }

    /// Create an envelope for a run that completed with error diagnostics
    #[must_use]
    pub const fn failed(data: T) -> Self {
        Self {
            status: "failed",
            data,
        }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Build a local mirror of provider packages from an upstream registry.
#[derive(Parser, Debug)]
#[command(name = "provider-mirror")]
#[command(about = "Build a local mirror of provider packages from an upstream registry")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        help = "Set log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit a JSON envelope instead of progress lines.
    #[arg(long, global = true, help = "Emit a JSON envelope instead of progress lines")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Download the providers declared in a manifest into a mirror directory.
    #[command(about = "Download the providers declared in a manifest into a mirror directory")]
    Mirror(MirrorArgs),
    /// Rebuild every index.json of a mirror directory from the packages on disk.
    #[command(about = "Rebuild index files of a mirror directory without network access")]
    Index {
        /// Mirror directory.
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

/// Arguments of `provider-mirror mirror`.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct MirrorArgs {
    /// Directory to build the mirror in.
    #[arg(value_name = "TARGET_DIR")]
    pub target_dir: PathBuf,

    /// Target platform (os_arch); repeatable. Defaults to the manifest, then the host.
    #[arg(long = "platform", short = 'p', value_name = "OS_ARCH")]
    pub platforms: Vec<String>,

    /// Manifest declaring the providers to mirror.
    #[arg(
        long,
        short = 'm',
        value_name = "FILE",
        default_value = provider_mirror_core::MANIFEST_FILENAME,
        env = "PROVIDER_MIRROR_MANIFEST"
    )]
    pub manifest: PathBuf,

    /// Number of dependencies and downloads processed concurrently.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Registry request timeout in seconds.
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,
}

/// Parse command-line arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mirror() {
        let cli = Cli::try_parse_from([
            "provider-mirror",
            "mirror",
            "./mirror",
            "--platform",
            "linux_amd64",
            "-p",
            "darwin_arm64",
            "--parallelism",
            "8",
        ])
        .unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        let Commands::Mirror(args) = cli.command else {
            panic!("expected mirror command");
        };
        assert_eq!(args.target_dir, PathBuf::from("./mirror"));
        assert_eq!(args.platforms, vec!["linux_amd64", "darwin_arm64"]);
        assert_eq!(args.parallelism, Some(8));
        assert_eq!(args.timeout_secs, None);
    }

    #[test]
    fn test_parse_index_with_global_flags() {
        let cli =
            Cli::try_parse_from(["provider-mirror", "index", "/srv/mirror", "--json", "-L", "debug"])
                .unwrap();
        assert!(cli.json);
        assert_eq!(cli.level, LogLevel::Debug);
        assert_eq!(
            cli.command,
            Commands::Index {
                dir: PathBuf::from("/srv/mirror")
            }
        );
    }

    #[test]
    fn test_mirror_requires_target_dir() {
        assert!(Cli::try_parse_from(["provider-mirror", "mirror"]).is_err());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: CliError = provider_mirror_core::Error::configuration("bad platform").into();
        assert_eq!(exit_code_for(&err), EXIT_CLI);
        assert_eq!(err.to_string(), "CLI/configuration error: bad platform");

        let err: CliError = provider_mirror_core::Error::transfer("https://x", "reset").into();
        assert_eq!(exit_code_for(&err), EXIT_MIRROR);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EXIT_OK, 0);
        assert_eq!(EXIT_MIRROR, 1);
        assert_eq!(EXIT_CLI, 2);
        assert_eq!(EXIT_SIGINT, 130);
    }

    #[test]
    fn test_envelopes() {
        let ok = serde_json::to_value(OkEnvelope::new(1)).unwrap();
        assert_eq!(ok["status"], "ok");
        let failed = serde_json::to_value(OkEnvelope::failed(1)).unwrap();
        assert_eq!(failed["status"], "failed");
        let err = serde_json::to_value(ErrorEnvelope::new("boom")).unwrap();
        assert_eq!(err["status"], "error");
    }
}
