use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod analyze;
mod assistant;
mod cli;
mod config;
mod heal;
mod schema;
mod script;
mod util;
mod verify;
mod workflow;

/// Per-module log levels, e.g. `AUTOINST_LOG=autoinst::verify=debug`.
const LOG_ENV: &str = "AUTOINST_LOG";

fn main() -> Result<ExitCode> {
    let args = cli::RootArgs::parse();
    init_tracing(args.global.verbose);
    workflow::run(args)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "autoinst=debug"
    } else {
        "autoinst=info"
    };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
