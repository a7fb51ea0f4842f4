//! sdg-coder binary entry point.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sdg_coder::cli::{Cli, execute};
use sdg_coder::error::CommandError;
use sdg_coder::{AgentError, Error};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // A missing .env file is normal; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(io::stderr(), "Error: {e:#}");
            exit_code(&e)
        }
    }
}

/// Runs the command and writes its output. A batch with failed inputs
/// still prints every entry before reporting the failure.
fn run(cli: &Cli) -> anyhow::Result<()> {
    match execute(cli) {
        Ok(output) => write_stdout(&output),
        Err(Error::Command(CommandError::PartialFailure {
            output,
            failed,
            total,
        })) => {
            write_stdout(&output)?;
            anyhow::bail!("{failed} of {total} input(s) failed")
        }
        Err(e) => Err(e.into()),
    }
}

fn write_stdout(output: &str) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end()).context("failed to write to stdout")
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "sdg_coder=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// 2 for configuration problems, 1 for everything else.
fn exit_code(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<Error>() {
        Some(Error::Agent(AgentError::ConfigurationMissing { .. })) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
