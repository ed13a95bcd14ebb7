//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Validate bank exports and roll them up into monthly summaries
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Two-stage ingestion pipeline for transaction files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, env = "TALLY_DB", default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Directory holding uploaded files
    #[arg(long, env = "TALLY_STORE", default_value = "tally-objects", global = true)]
    pub store: PathBuf,

    /// Pipeline config (defaults to ~/.local/share/tally/pipeline.toml, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed file configs and aggregation tasks
    Init,

    /// Upload a transaction file (checksum, config match, header check)
    Upload {
        /// File to upload
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Validate, clean and store the rows of an uploaded file
    Silver {
        /// Id printed by `upload`
        #[arg(long)]
        file_id: String,
    },

    /// Recompute all active summary tables
    Gold,

    /// Upload a file and run Silver and Gold on it
    Ingest {
        /// File to ingest
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List uploaded files
    Files {
        /// Only files with this status: uploaded, processing, completed, partial, failed
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show rejected rows of a file
    Rejected {
        #[arg(long)]
        file_id: String,
    },

    /// Show a summary table
    Summary {
        /// monthly, category, savings
        #[arg(default_value = "monthly")]
        kind: String,
    },

    /// Record the status of a file whose rows were stored but whose status update failed
    RetryStatus {
        #[arg(long)]
        file_id: String,
    },
}
