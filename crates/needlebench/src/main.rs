mod cli;
mod config;
mod logging;
mod run;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;
use crate::config::HarnessConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    let config = HarnessConfig::from_cli(&cli)?;
    run::run(config)
}
