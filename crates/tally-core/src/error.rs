//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Raw content could not be fetched from the object store
    #[error("Transport error: {0}")]
    Transport(String),

    /// File structure is unreadable (encoding, header, missing columns)
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cleaning error: {0}")]
    Cleaning(#[from] CleaningError),

    /// An insert failed; `written` rows of the batch are already durable
    #[error("Persistence error after {written} rows written: {message}")]
    Persistence { written: usize, message: String },

    /// Data is durable but the file status could not be recorded
    #[error("Metadata update error: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate file: {0}")]
    DuplicateFile(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Row-level cleaning failure, carried into the rejected record's message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CleaningError {
    #[error("missing value for {0}")]
    Missing(String),

    #[error("date '{value}' does not match format '{format}'")]
    Date { value: String, format: String },

    #[error("amount '{0}' is not a number")]
    Amount(String),
}

pub type Result<T> = std::result::Result<T, Error>;
