//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `file_configs` - File parsing contracts and name-pattern resolution
//! - `files` - Uploaded file metadata and status transitions
//! - `records` - Accepted and rejected transaction records
//! - `summaries` - Summary table upserts and reads
//! - `tasks` - Aggregation task configuration

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};

mod file_configs;
mod files;
mod records;
mod summaries;
mod tasks;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Timestamp format used for every DATETIME column
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date format used for every DATE column
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored DATE column, surfacing corrupt rows as a conversion error
pub(crate) fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a stored decimal (amounts are kept as TEXT to stay exact)
pub(crate) fn parse_decimal(s: &str) -> rusqlite::Result<Decimal> {
    s.parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: &str) -> Result<Self> {
        // Foreign keys are a per-connection setting in SQLite
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same data.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any leftovers from an earlier run
        let _ = std::fs::remove_file(&path);

        let path = path
            .to_str()
            .ok_or_else(|| Error::InvalidData("Temp path is not valid UTF-8".into()))?
            .to_string();
        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the single writer of a run
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- File parsing contracts, matched against uploaded file names
            CREATE TABLE IF NOT EXISTS file_configs (
                id INTEGER PRIMARY KEY,
                file_pattern TEXT NOT NULL,
                delimiter TEXT NOT NULL DEFAULT ',',
                encoding TEXT NOT NULL DEFAULT 'windows-1252',
                decimal_separator TEXT NOT NULL DEFAULT '.',
                amount_format TEXT NOT NULL DEFAULT 'heuristic',   -- heuristic, explicit
                date_format TEXT NOT NULL DEFAULT '%d.%m.%y',
                amount_sign INTEGER NOT NULL DEFAULT 1,
                expected_columns TEXT NOT NULL DEFAULT 'TRANSACTION_DATE,AMOUNT,DESCRIPTION',
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_file_configs_pattern ON file_configs(file_pattern);

            -- Uploaded files (one batch each)
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                row_count INTEGER NOT NULL,
                checksum TEXT NOT NULL UNIQUE,                     -- SHA-224 of the raw bytes
                config_id INTEGER NOT NULL REFERENCES file_configs(id),
                status INTEGER NOT NULL DEFAULT 1,                 -- 1 uploaded, 2 processing, 3 completed, 4 partial, 9 failed
                error_message TEXT,
                inserted_at DATETIME NOT NULL,
                ingested_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);

            -- Accepted transactions (silver)
            CREATE TABLE IF NOT EXISTS accepted_records (
                id INTEGER PRIMARY KEY,
                file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                source_line INTEGER NOT NULL,
                transaction_date DATE NOT NULL,
                amount TEXT NOT NULL,                              -- exact decimal
                description TEXT NOT NULL,
                category TEXT,
                account TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accepted_file ON accepted_records(file_id);
            CREATE INDEX IF NOT EXISTS idx_accepted_date ON accepted_records(transaction_date);

            -- Rejected transactions, stored as raw strings
            CREATE TABLE IF NOT EXISTS rejected_records (
                id INTEGER PRIMARY KEY,
                file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                source_line INTEGER NOT NULL,
                transaction_date TEXT,
                amount TEXT,
                description TEXT,
                category TEXT,
                account TEXT,
                error_message TEXT NOT NULL,
                ready_for_reload BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_rejected_file ON rejected_records(file_id);

            -- Gold: monthly totals
            CREATE TABLE IF NOT EXISTS monthly_summary (
                id INTEGER PRIMARY KEY,
                transaction_month DATE NOT NULL UNIQUE,
                total_expenses TEXT NOT NULL,
                total_earnings TEXT NOT NULL,
                total_savings TEXT NOT NULL,
                net_total TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                computed_at DATETIME NOT NULL
            );

            -- Gold: per month and category totals
            CREATE TABLE IF NOT EXISTS category_summary (
                id INTEGER PRIMARY KEY,
                transaction_month DATE NOT NULL,
                category TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                computed_at DATETIME NOT NULL,
                UNIQUE(transaction_month, category)
            );

            CREATE INDEX IF NOT EXISTS idx_category_summary_category ON category_summary(category);

            -- Gold: savings rate per month
            CREATE TABLE IF NOT EXISTS savings_rate_summary (
                id INTEGER PRIMARY KEY,
                transaction_month DATE NOT NULL UNIQUE,
                savings_rate TEXT NOT NULL,
                computed_at DATETIME NOT NULL
            );

            -- Aggregation jobs, authored outside the runner
            CREATE TABLE IF NOT EXISTS aggregation_tasks (
                id INTEGER PRIMARY KEY,
                target_table TEXT NOT NULL UNIQUE,
                routine TEXT NOT NULL,                             -- registered routine id
                active BOOLEAN NOT NULL DEFAULT 0,
                depends_on INTEGER REFERENCES aggregation_tasks(id),
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
