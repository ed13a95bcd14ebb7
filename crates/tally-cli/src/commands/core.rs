//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_store` - Shared utility to open the object store
//! - `load_config` - Pipeline config resolution
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{config::AppConfig, db::Database, object_store::LocalObjectStore};

pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::new(path_str).context("Failed to open database")
}

pub fn open_store(store_path: &Path) -> Result<LocalObjectStore> {
    LocalObjectStore::new(store_path)
        .with_context(|| format!("Failed to open object store at {}", store_path.display()))
}

pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(config_path).context("Failed to load pipeline config")
}

pub fn cmd_init(db_path: &Path, store_path: &Path, config_path: Option<&Path>) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;
    open_store(store_path)?;
    let config = load_config(config_path)?;

    let seeded = config.seed(&db).context("Failed to seed configuration")?;
    println!("   Seeded {} file configs", seeded.file_configs);
    println!("   Seeded {} aggregation tasks", seeded.aggregation_tasks);
    println!("   Object store: {}", store_path.display());

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Ingest a file: tally ingest --file ubs_2024_01.csv");
    println!("  2. Look at the result: tally summary monthly");

    Ok(())
}
