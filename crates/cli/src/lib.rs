//! provider-mirror command-line application.
//!
//! The binary is a thin wrapper: argument parsing lives in [`cli`], the
//! subcommands in [`commands`], progress rendering in [`reporter`] and log
//! setup in [`tracing`]. All mirroring logic is in `provider-mirror-core`.

pub mod cli;
pub mod commands;
pub mod reporter;
pub mod tracing;
