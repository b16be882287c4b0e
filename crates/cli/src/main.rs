//! provider-mirror CLI application
//!
//! Builds a static, offline-usable mirror of provider packages from an
//! upstream registry, driven by a `mirror.toml` manifest.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use provider_mirror::cli::{self, CliError, Commands, EXIT_SIGINT, exit_code_for, render_error};
use provider_mirror::commands;
use provider_mirror::tracing::{self, TracingConfig};
use ::tracing::Instrument;

fn main() {
    // Tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    // Ignore error if tracing already initialized (e.g., in tests)
    let _ = tracing::init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        ..Default::default()
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let err = CliError::other(format!("Failed to create tokio runtime: {e}"));
            render_error(&err, cli.json);
            std::process::exit(exit_code_for(&err));
        }
    };

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code);
}

/// Run the selected subcommand, aborting cleanly on Ctrl-C.
///
/// Dropping the in-flight future removes any staging files, so an
/// interrupted run never leaves partial packages behind.
async fn run(cli: cli::Cli) -> i32 {
    let span = ::tracing::info_span!(
        "command",
        correlation_id = %tracing::correlation_id(),
    );

    let work = async {
        match &cli.command {
            Commands::Mirror(args) => commands::mirror(args, cli.json).await,
            Commands::Index { dir } => commands::index(dir, cli.json).await,
        }
    }
    .instrument(span);

    let result = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted; packages already mirrored are kept.");
            return EXIT_SIGINT;
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    }
}
