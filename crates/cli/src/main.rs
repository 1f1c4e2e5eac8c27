//! `stockroom`: inventory tracking from the command line.

mod backup;
mod cli;
mod commands;
mod export;

use std::process::ExitCode;

use clap::Parser;
use stockroom_observability::LogFormat;

#[tokio::main]
async fn main() -> ExitCode {
    stockroom_observability::init_with(LogFormat::from_env(), "warn");

    let cli = cli::Cli::parse();
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
