//! Tally CLI - Transaction file ingestion pipeline
//!
//! Usage:
//!   tally init                     Initialize database and seed config
//!   tally upload --file CSV        Upload a file
//!   tally silver --file-id ID      Validate and store its rows
//!   tally gold                     Recompute summary tables
//!   tally ingest --file CSV        All of the above for one file

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, &cli.store, config_path),
        Commands::Upload { file } => {
            let db = commands::open_db(&cli.db)?;
            let store = commands::open_store(&cli.store)?;
            commands::cmd_upload(&db, &store, &file, cli.json).map(|_| ())
        }
        Commands::Silver { file_id } => {
            let db = commands::open_db(&cli.db)?;
            let store = commands::open_store(&cli.store)?;
            commands::cmd_silver(&db, &store, &file_id, cli.json)
        }
        Commands::Gold => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_gold(&db, &config, cli.json)
        }
        Commands::Ingest { file } => {
            let db = commands::open_db(&cli.db)?;
            let store = commands::open_store(&cli.store)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_ingest(&db, &store, &config, &file, cli.json)
        }
        Commands::Files { status } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_files(&db, status.as_deref(), cli.json)
        }
        Commands::Rejected { file_id } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_rejected(&db, &file_id, cli.json)
        }
        Commands::Summary { kind } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_summary(&db, &kind, cli.json)
        }
        Commands::RetryStatus { file_id } => {
            let db = commands::open_db(&cli.db)?;
            let store = commands::open_store(&cli.store)?;
            commands::cmd_retry_status(&db, &store, &file_id, cli.json)
        }
    }
}
