//! `gpslog` - CLI for gpslogger
//!
//! This binary drives capture sessions against the simulated position
//! source and gives access to the stored location history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use gpslogger::cli::{
    Cli, Command, ConfigCommand, HistoryCommand, OutputFormat, PurgeCommand, TrackCommand,
};
use gpslogger::{
    init_logging, CaptureController, Config, ConsolePresenter, Coordinate, LocationRecord,
    SimulatedSource, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Track(cmd) => handle_track(&config, &cmd).await,
        Command::History(cmd) => handle_history(&config, &cmd),
        Command::Purge(cmd) => handle_purge(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

async fn handle_track(config: &Config, cmd: &TrackCommand) -> anyhow::Result<()> {
    let store = Store::open(config.database_path()).context("opening location store")?;

    let interval = cmd
        .interval_ms
        .map_or_else(|| config.update_interval(), Duration::from_millis);
    let source = SimulatedSource::new(Coordinate::new(cmd.latitude, cmd.longitude))
        .with_points(cmd.points)
        .with_interval(interval)
        .with_distance_filter(config.capture.distance_filter_meters)
        .with_accuracy(config.capture.desired_accuracy);

    let mut controller = CaptureController::new(
        store,
        source,
        ConsolePresenter::default(),
        config.retention(),
    );

    if cmd.fresh {
        controller.clear_all()?;
    }

    let purged = controller.startup()?;
    if purged > 0 {
        println!("purged {purged} stale records");
    }

    controller.toggle().await?;
    while controller.step().await? {}
    controller.toggle().await?;

    let records = controller.load_live_records()?;
    println!("session complete: {} records stored", records.len());
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let store = Store::open(config.database_path()).context("opening location store")?;
    let records = store.recent(cmd.limit)?;

    match cmd.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                println!("no records");
                return Ok(());
            }
            println!("{:>6}  {:>12}  {:>12}  created at", "id", "latitude", "longitude");
            for record in &records {
                println!(
                    "{:>6}  {:>12.6}  {:>12.6}  {}",
                    record.id.unwrap_or(0),
                    record.latitude,
                    record.longitude,
                    record.created_at.to_rfc3339(),
                );
            }
        }
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", plain_line(record));
            }
        }
    }
    Ok(())
}

fn plain_line(record: &LocationRecord) -> String {
    format!(
        "{},{} {}",
        record.latitude,
        record.longitude,
        record.created_at.to_rfc3339()
    )
}

fn handle_purge(config: &Config, cmd: &PurgeCommand) -> anyhow::Result<()> {
    let mut store = Store::open(config.database_path()).context("opening location store")?;

    let deleted = if cmd.all {
        store.delete_all()?
    } else {
        store.delete_older_than(config.retention().cutoff(Utc::now()))?
    };

    println!("deleted {deleted} records");
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = Store::open(config.database_path()).context("opening location store")?;
    let stats = store.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": store.path(),
            "total_records": stats.total_records,
            "oldest_record": stats.oldest_record,
            "newest_record": stats.newest_record,
            "db_size_bytes": stats.db_size_bytes,
            "retention_hours": config.storage.retention_hours,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("gpslog status");
        println!("-------------");
        println!("Database:   {}", store.path().display());
        println!("Records:    {}", stats.total_records);
        if let Some(oldest) = stats.oldest_record {
            println!("Oldest:     {}", oldest.to_rfc3339());
        }
        if let Some(newest) = stats.newest_record {
            println!("Newest:     {}", newest.to_rfc3339());
        }
        println!("Size:       {} bytes", stats.db_size_bytes);
        println!("Retention:  {} hours", config.storage.retention_hours);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:    {}", config.database_path().display());
                println!("  Retention hours:  {}", config.storage.retention_hours);
                println!();
                println!("[Capture]");
                println!(
                    "  Distance filter:  {} m",
                    config.capture.distance_filter_meters
                );
                println!("  Accuracy:         {:?}", config.capture.desired_accuracy);
                println!("  Update interval:  {} ms", config.capture.update_interval_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.clone().unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
