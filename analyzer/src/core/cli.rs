use clap::{Parser, Subcommand};

use std::path::PathBuf;

use chrono::NaiveDate;

use super::config::OutputFormat;
use super::constants::{
    ENV_BASE_DATE, ENV_CONFIG, ENV_DEBUG, ENV_FORMAT, ENV_OUTPUT, ENV_STAGED, ENV_WORKERS,
};

#[derive(Parser)]
#[command(name = "ctrlscope")]
#[command(
    version,
    about = "Reconstruct command windows and link transactions from controller traces",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, short = 'f', global = true, env = ENV_FORMAT, value_parser = parse_output_format)]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o', global = true, env = ENV_OUTPUT)]
    pub output: Option<PathBuf>,

    /// Run the staged (multi-task) pipeline
    #[arg(long, global = true, env = ENV_STAGED)]
    pub staged: bool,

    /// Decode workers for the staged pipeline
    #[arg(long, short = 'w', global = true, env = ENV_WORKERS)]
    pub workers: Option<usize>,

    /// Date attached to time-only lifecycle timestamps (YYYY-MM-DD)
    #[arg(long, global = true, env = ENV_BASE_DATE, value_parser = parse_base_date)]
    pub base_date: Option<NaiveDate>,

    /// Enable debug mode (verbose pipeline logging)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,
}

/// Parse output format from CLI/env string
fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!("Invalid output format '{}'. Valid options: text, json", s)),
    }
}

/// Parse base date from CLI/env string
fn parse_base_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid base date '{}' (expected YYYY-MM-DD): {}", s, e))
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Reconstruct link transactions from a communication trace
    Comm {
        /// Communication trace file
        file: PathBuf,
    },
    /// Reconstruct command windows from a control (lifecycle) trace
    Control {
        /// Control trace file
        file: PathBuf,
    },
    /// Analyze a communication trace and a control trace in one run
    Combined {
        /// Communication trace file
        #[arg(long)]
        comm: PathBuf,
        /// Control trace file
        #[arg(long)]
        control: PathBuf,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub output: Option<PathBuf>,
    pub staged: bool,
    pub workers: Option<usize>,
    pub base_date: Option<NaiveDate>,
    pub debug: bool,
}

impl Cli {
    fn into_parts(self) -> (CliConfig, Commands) {
        let config = CliConfig {
            config: self.config,
            format: self.format,
            output: self.output,
            staged: self.staged,
            workers: self.workers,
            base_date: self.base_date,
            debug: self.debug,
        };
        (config, self.command)
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    Cli::parse().into_parts()
}
