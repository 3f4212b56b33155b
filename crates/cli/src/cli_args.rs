use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "agentry", version, about = "A2A agent runtime tooling")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scaffold a commented agent manifest
    Init {
        /// Where to write the manifest
        #[arg(default_value = "agent.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load, compose and validate a manifest
    Doctor {
        #[arg(long, default_value = "agent.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration
    PrintConfig {
        #[arg(long, default_value = "agent.toml")]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Mask secret-looking values
        #[arg(long)]
        redact: bool,
        #[arg(long, value_enum, default_value_t = PromptMode::Summary)]
        prompt: PromptMode,
    },
    /// Assemble the on-chain registration payload for this agent
    Register {
        #[arg(long, default_value = "agent.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PromptMode {
    /// First line and size only
    Summary,
    /// The whole rendered prompt
    Full,
}
