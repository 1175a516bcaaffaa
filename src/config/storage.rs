//! Storage configuration types.

use serde::Deserialize;

/// Default on-disk ledger location.
pub const DEFAULT_SQLITE_PATH: &str = "data/silo-ledger.db";

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite database file. `:memory:` opens a private in-memory database.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            path: DEFAULT_SQLITE_PATH.to_string(),
        }
    }
}

impl StorageConfig {
    /// Ephemeral in-process storage.
    pub fn in_memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            path: String::new(),
        }
    }

    /// SQLite at the given path.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            path: path.into(),
        }
    }
}
