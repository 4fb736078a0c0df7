//! Command-line interface for gpslogger.
//!
//! This module provides the CLI structure for the `gpslog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, HistoryCommand, OutputFormat, PurgeCommand, StatusCommand, TrackCommand,
};

/// gpslog - Record where you've been
///
/// Captures position updates into a local database, keeps 24 hours of
/// history, and lets you review the trail from the command line.
#[derive(Debug, Parser)]
#[command(name = "gpslog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a capture session with the simulated position source
    Track(TrackCommand),

    /// List captured locations
    History(HistoryCommand),

    /// Delete stale records (or everything with --all)
    Purge(PurgeCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
