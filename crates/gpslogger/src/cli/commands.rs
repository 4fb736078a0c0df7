//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Track command arguments.
#[derive(Debug, Args)]
pub struct TrackCommand {
    /// Number of position updates to capture before stopping
    #[arg(short, long, default_value = "10")]
    pub points: usize,

    /// Milliseconds between updates (overrides the configured interval)
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Starting latitude for the simulated walk
    #[arg(long, default_value = "35.0", allow_hyphen_values = true)]
    pub latitude: f64,

    /// Starting longitude for the simulated walk
    #[arg(long, default_value = "139.0", allow_hyphen_values = true)]
    pub longitude: f64,

    /// Clear all stored records before the session starts
    #[arg(long)]
    pub fresh: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Purge command arguments.
#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Delete every record regardless of age
    #[arg(long)]
    pub all: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
