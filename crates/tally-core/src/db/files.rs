//! Uploaded file metadata operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{FileRecord, FileStatus, NewFileRecord};

const FILE_COLUMNS: &str = "id, name, size, row_count, checksum, config_id, status, \
     error_message, inserted_at, ingested_at";

fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    let status: i64 = row.get(6)?;
    let inserted_at: String = row.get(8)?;
    let ingested_at: Option<String> = row.get(9)?;
    Ok(FileRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        row_count: row.get(3)?,
        checksum: row.get(4)?,
        config_id: row.get(5)?,
        status: FileStatus::from_code(status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Integer,
                format!("unknown file status code {}", status).into(),
            )
        })?,
        error_message: row.get(7)?,
        inserted_at: parse_datetime(&inserted_at),
        ingested_at: ingested_at.as_deref().map(parse_datetime),
    })
}

impl Database {
    /// Insert metadata for a freshly uploaded file (status `Uploaded`)
    pub fn insert_file(&self, file: &NewFileRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO files (id, name, size, row_count, checksum, config_id, status, inserted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                file.id,
                file.name,
                file.size,
                file.row_count,
                file.checksum,
                file.config_id,
                FileStatus::Uploaded.code(),
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Get a file by id
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn()?;
        let file = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS),
                params![id],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    /// Look up a file by content checksum (exact re-upload detection)
    pub fn get_file_by_checksum(&self, checksum: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn()?;
        let file = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE checksum = ?", FILE_COLUMNS),
                params![checksum],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    /// List files, newest first, optionally restricted to one status
    pub fn list_files(&self, status: Option<FileStatus>) -> Result<Vec<FileRecord>> {
        let conn = self.conn()?;
        let files = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM files WHERE status = ? ORDER BY inserted_at DESC, id",
                    FILE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.code()], row_to_file)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM files ORDER BY inserted_at DESC, id",
                    FILE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], row_to_file)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(files)
    }

    /// Move a file to `Processing` at the start of a run
    pub fn mark_file_processing(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE files SET status = ?, error_message = NULL WHERE id = ?",
            params![FileStatus::Processing.code(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("File {}", id)));
        }
        Ok(())
    }

    /// Record a run's terminal status and ingestion time
    pub fn update_file_status(
        &self,
        id: &str,
        status: FileStatus,
        ingested_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE files SET status = ?, ingested_at = ?, error_message = ? WHERE id = ?",
            params![
                status.code(),
                format_datetime(&ingested_at),
                error_message,
                id
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("File {}", id)));
        }
        Ok(())
    }
}
