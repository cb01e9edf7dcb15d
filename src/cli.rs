//! CLI argument parsing for screenlign

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for correlation reports
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// Full report as JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "screenlign")]
#[command(version)]
#[command(about = "Validate telemetry event streams against screen-derived state timelines", long_about = None)]
pub struct Cli {
    /// Observation timeline (JSONL, one Observation per line, time-ordered)
    #[arg(short = 'o', long = "observations", value_name = "FILE")]
    pub observations: PathBuf,

    /// Telemetry events (JSONL, one Event per line); repeat for multiple
    /// adapters
    #[arg(short = 'e', long = "events", value_name = "FILE", required = true)]
    pub events: Vec<PathBuf>,

    /// Run configuration (TOML); defaults apply when omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stable device identifier (enables known-device mode, overrides config)
    #[arg(long = "device-key", value_name = "KEY")]
    pub device_key: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging to stderr
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}
