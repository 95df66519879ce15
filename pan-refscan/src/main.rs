use std::process::ExitCode;

use clap::Parser;
use pan_refscan::analysis::AnalysisError;
use pan_refscan::cancel::Canceled;
use pan_refscan::ingest::IngestError;

mod analyze_cmd;
mod cleanup_cmd;
mod cli;
mod copy_cmd;
mod groups_cmd;
mod loader;
mod redundant_cmd;

use cli::{Cli, Command};

/// Conventional status for an interrupted run.
const EXIT_CANCELED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    let result = match cli.command {
        Command::Analyze(args) => analyze_cmd::run_analyze(args, verbose),
        Command::Redundant(args) => redundant_cmd::run_redundant(args),
        Command::Cleanup(args) => cleanup_cmd::run_cleanup(args),
        Command::Copy(args) => copy_cmd::run_copy(args),
        Command::Groups(args) => groups_cmd::run_groups(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if is_cancellation(&err) {
                ExitCode::from(EXIT_CANCELED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    // Reports go to stdout; keep it clean.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<Canceled>()
            || cause.is::<AnalysisError>()
            || cause
                .downcast_ref::<IngestError>()
                .is_some_and(IngestError::is_canceled)
    })
}
