//! File config operations

use regex::Regex;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{AmountFormat, FileConfig, NewFileConfig};

const CONFIG_COLUMNS: &str = "id, file_pattern, delimiter, encoding, decimal_separator, \
     amount_format, date_format, amount_sign, expected_columns, description";

fn text_to_char(s: String, idx: usize) -> rusqlite::Result<char> {
    s.chars().next().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("empty single-character column {}", idx).into(),
        )
    })
}

fn text_to_amount_format(s: String, idx: usize) -> rusqlite::Result<AmountFormat> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn row_to_config(row: &Row) -> rusqlite::Result<FileConfig> {
    let expected: String = row.get(8)?;
    Ok(FileConfig {
        id: row.get(0)?,
        file_pattern: row.get(1)?,
        delimiter: text_to_char(row.get(2)?, 2)?,
        encoding: row.get(3)?,
        decimal_separator: text_to_char(row.get(4)?, 4)?,
        amount_format: text_to_amount_format(row.get(5)?, 5)?,
        date_format: row.get(6)?,
        amount_sign: row.get(7)?,
        expected_columns: expected
            .split(',')
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect(),
        description: row.get(9)?,
    })
}

impl Database {
    /// Store a file parsing contract, returning its id
    pub fn insert_file_config(&self, config: &NewFileConfig) -> Result<i64> {
        // Fail early on patterns that could never match anything
        Regex::new(&config.file_pattern)?;

        if config.amount_sign != 1 && config.amount_sign != -1 {
            return Err(Error::Config(format!(
                "amount_sign must be 1 or -1, got {}",
                config.amount_sign
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO file_configs (file_pattern, delimiter, encoding, decimal_separator,
                                      amount_format, date_format, amount_sign, expected_columns, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                config.file_pattern,
                config.delimiter.to_string(),
                config.encoding,
                config.decimal_separator.to_string(),
                config.amount_format.as_str(),
                config.date_format,
                config.amount_sign,
                config.expected_columns.join(","),
                config.description,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a file config by id
    pub fn get_file_config(&self, id: i64) -> Result<Option<FileConfig>> {
        let conn = self.conn()?;
        let config = conn
            .query_row(
                &format!("SELECT {} FROM file_configs WHERE id = ?", CONFIG_COLUMNS),
                params![id],
                row_to_config,
            )
            .optional()?;
        Ok(config)
    }

    /// List all file configs in resolution order
    pub fn list_file_configs(&self) -> Result<Vec<FileConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_configs ORDER BY id",
            CONFIG_COLUMNS
        ))?;
        let configs = stmt
            .query_map([], row_to_config)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(configs)
    }

    /// Find the config whose pattern matches `file_name` (lowest id wins)
    pub fn resolve_config(&self, file_name: &str) -> Result<FileConfig> {
        for config in self.list_file_configs()? {
            let pattern = match Regex::new(&config.file_pattern) {
                Ok(p) => p,
                Err(e) => {
                    warn!(config_id = config.id, error = %e, "Skipping file config with invalid pattern");
                    continue;
                }
            };
            if pattern.is_match(file_name) {
                debug!(config_id = config.id, file_name, "Resolved file config");
                return Ok(config);
            }
        }

        Err(Error::NotFound(format!(
            "No file configuration matches '{}'",
            file_name
        )))
    }
}
