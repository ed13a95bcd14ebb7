//! File intake
//!
//! Accepts an uploaded file into the system before any pipeline work:
//! exact re-uploads are refused by content checksum, the file name picks the
//! parsing contract, the header is checked against it, and the bytes are
//! stored under a fresh file id with a `FileRecord` in status `Uploaded`.

use std::fs;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha224};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::NewFileRecord;
use crate::object_store::ObjectStore;
use crate::reader;

/// SHA-224 of the raw bytes, hex encoded
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// What intake recorded for an accepted upload
#[derive(Debug, Clone, Serialize)]
pub struct IntakeReceipt {
    pub file_id: String,
    pub name: String,
    pub size: i64,
    pub row_count: i64,
    pub checksum: String,
    pub config_id: i64,
}

pub struct FileIntake<'a> {
    db: &'a Database,
    store: &'a dyn ObjectStore,
}

impl<'a> FileIntake<'a> {
    pub fn new(db: &'a Database, store: &'a dyn ObjectStore) -> Self {
        Self { db, store }
    }

    /// Accept `bytes` uploaded under `file_name`
    pub fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<IntakeReceipt> {
        let checksum = checksum(bytes);
        if let Some(existing) = self.db.get_file_by_checksum(&checksum)? {
            return Err(Error::DuplicateFile(format!(
                "'{}' has the same content as file {} ('{}')",
                file_name, existing.id, existing.name
            )));
        }

        let config = self.db.resolve_config(file_name)?;
        let parsed = reader::read_records(bytes, &config)?;

        let record = NewFileRecord {
            id: Uuid::new_v4().to_string(),
            name: file_name.to_string(),
            size: bytes.len() as i64,
            row_count: parsed.rows.len() as i64,
            checksum,
            config_id: config.id,
        };

        self.store.put(&record.id, bytes)?;
        if let Err(e) = self.db.insert_file(&record) {
            // Don't leave an orphaned object behind
            if let Err(cleanup) = self.store.delete(&record.id) {
                warn!(file_id = %record.id, error = %cleanup, "Failed to remove object after failed insert");
            }
            return Err(e);
        }

        info!(
            file_id = %record.id,
            name = %record.name,
            rows = record.row_count,
            config_id = record.config_id,
            "File uploaded"
        );

        Ok(IntakeReceipt {
            file_id: record.id,
            name: record.name,
            size: record.size,
            row_count: record.row_count,
            checksum: record.checksum,
            config_id: record.config_id,
        })
    }

    /// Read a file from disk and accept it under its own file name
    pub fn upload_path(&self, path: &Path) -> Result<IntakeReceipt> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidData(format!("Invalid file name: {}", path.display())))?;
        let bytes = fs::read(path)?;
        self.upload(file_name, &bytes)
    }
}
