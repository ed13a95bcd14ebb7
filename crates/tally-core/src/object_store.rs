//! Raw file storage with pluggable backends
//!
//! Uploaded bytes are kept outside the database, keyed by file id. The
//! Silver stage only ever downloads; intake puts, and nothing in the core
//! deletes except an intake that failed after storing.
//!
//! - `ObjectStore` trait defines the interface for storage backends
//! - `LocalObjectStore` keeps one file per object under a root directory

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Trait for raw file storage backends
pub trait ObjectStore: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &str;

    /// Store an object under `key`, replacing nothing
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch an object's bytes
    ///
    /// Any failure is reported as `Error::Transport`.
    fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove an object
    fn delete(&self, key: &str) -> Result<()>;
}

/// Local directory object store, one file per key
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Transport(format!(
                    "Failed to create object store directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created object store directory: {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are file ids; anything that could escape the root is refused
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(Error::Transport(format!("Invalid object key: '{}'", key)));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;

        if path.exists() {
            return Err(Error::Transport(format!("Object already exists: {}", key)));
        }

        fs::write(&path, bytes)
            .map_err(|e| Error::Transport(format!("Failed to write object {}: {}", key, e)))?;
        debug!(key, size = bytes.len(), "Stored object");
        Ok(())
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|e| {
            Error::Transport(format!("Failed to download object {}: {}", key, e))
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        fs::remove_file(&path)
            .map_err(|e| Error::Transport(format!("Failed to delete object {}: {}", key, e)))?;
        debug!(key, "Deleted object");
        Ok(())
    }
}
