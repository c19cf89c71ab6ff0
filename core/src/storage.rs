//! Key-value persistence for the cluster registry
//!
//! The registry only needs two operations, `load` and `save`, over string
//! values. [`FileStore`] keeps one JSON file per key under a directory and
//! writes atomically through a temporary file; [`MemoryStore`] keeps values
//! in a map and is what tests inject.
//!
//! # Layout
//!
//! ```text
//! ~/.dapp-scaffold/
//!   solana-clusters.json   [{"name":"devnet","network":"devnet","endpoint":"..."}]
//!   solana-cluster.json    "devnet"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::config::StorageSettings;
use crate::error::{Error, Result};

/// Process-wide persistence capability
pub trait Persistence: Send + Sync {
    /// Read the value stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no key is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed persistence, one file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the configured directory, creating it if needed
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        fs::create_dir_all(&settings.path).map_err(|e| {
            Error::storage(format!("Failed to create storage directory: {}", e))
        })?;

        Ok(Self {
            root: settings.path.clone(),
        })
    }

    /// Get the file path backing a key
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

impl Persistence for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;

        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;

        // Write to file atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, value)
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", key, e)))?;

        fs::rename(&temp_path, &path)
            .map_err(|e| Error::storage(format!("Failed to rename {}: {}", key, e)))?;

        tracing::debug!(key, path = %path.display(), "persisted value");
        Ok(())
    }
}
