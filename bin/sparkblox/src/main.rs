//! sparkblox is a CLI tool to deploy, wire and verify the Sparkblox contracts.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Values from .env act as environment variables, so they must be loaded before parsing.
    dotenv::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_failure_code(&err));
        }
    };

    // Initialize the logger. Logs go to stderr, stdout carries the deployment summary.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Exit code for a command line that could not be parsed.
///
/// Help and version requests are reported through the error path but are not failures.
fn parse_failure_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { 1 } else { 0 }
}
