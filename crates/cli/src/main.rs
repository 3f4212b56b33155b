use anyhow::Result;
use clap::Parser;

mod cli_args;
mod commands;
mod tracing;

use cli_args::{CliArgs, Commands};
use commands::{run_doctor, run_init, run_print_config, run_register};
use tracing::setup_logging;

fn main() -> Result<()> {
    setup_logging();
    let args = CliArgs::parse();

    match args.command {
        Commands::Init { path, force } => run_init(&path, force),
        Commands::Doctor { config } => run_doctor(&config),
        Commands::PrintConfig {
            config,
            format,
            redact,
            prompt,
        } => run_print_config(&config, format, redact, prompt),
        Commands::Register { config } => run_register(&config),
    }
}
