use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use crate::config::TransportChoice;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    pub output: crate::cli::output::OutputFormat,

    /// Transport used to reach the remote target (overrides the config file)
    #[arg(short, long)]
    pub transport: Option<TransportChoice>,

    /// Timeout applied to every wait, e.g. "10s" or "1500ms" (overrides the config file)
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    #[command(subcommand)]
    pub command: Commands,
}
