//! Ledger persistence backends.
//!
//! This module contains:
//! - `LedgerBackend` trait: durable keyed document storage per collection
//! - `Collection`, `Document`, `Filter`: the backend's data vocabulary
//! - Implementations: SQLite (via `sqlx` + `sea-query`), in-memory
//!
//! Backends know nothing about record types or validation; the typed layer
//! lives in [`crate::store`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::model::{SyncState, ValidationError};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryLedgerBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerBackend;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Record already exists: collection={collection}, key={key}")]
    Conflict { collection: Collection, key: String },

    #[error("Ledger store is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage type '{0}' is not available in this build")]
    Unsupported(String),
}

impl StorageError {
    /// True when the failure is a schema violation of the submitted record.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}

/// The closed set of ledger collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Events,
    Silos,
    Analyses,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Events, Collection::Silos, Collection::Analyses];

    /// Table / collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Silos => "silos",
            Collection::Analyses => "analyses",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record: primary key, indexed columns and the full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub silo_id: Option<String>,
    pub sync_state: Option<SyncState>,
    pub created_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

/// How a write treats an existing row with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `StorageError::Conflict` if the key exists.
    Insert,
    /// Insert or replace.
    Upsert,
}

/// Row selection pushed down to the backend (mirrors the indexed columns).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    All,
    BySilo(String),
    BySyncState(SyncState),
    BySiloAndState(String, SyncState),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::BySilo(silo) => doc.silo_id.as_deref() == Some(silo.as_str()),
            Filter::BySyncState(state) => doc.sync_state == Some(*state),
            Filter::BySiloAndState(silo, state) => {
                doc.silo_id.as_deref() == Some(silo.as_str()) && doc.sync_state == Some(*state)
            }
        }
    }

    pub(crate) fn silo(&self) -> Option<&str> {
        match self {
            Filter::BySilo(silo) | Filter::BySiloAndState(silo, _) => Some(silo),
            _ => None,
        }
    }

    pub(crate) fn sync_state(&self) -> Option<SyncState> {
        match self {
            Filter::BySyncState(state) | Filter::BySiloAndState(_, state) => Some(*state),
            _ => None,
        }
    }
}

/// Interface for ledger persistence.
///
/// Every single-document write is atomic: after a failed write the previous
/// committed state is intact. `write_batch` is atomic across its documents.
///
/// Implementations:
/// - `SqliteLedgerBackend`: durable SQLite storage
/// - `MemoryLedgerBackend`: in-process maps, for tests and ephemeral use
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Create tables / indexes if missing.
    async fn init(&self) -> Result<()>;

    /// Write one document.
    async fn write(&self, collection: Collection, doc: Document, mode: WriteMode) -> Result<()>;

    /// Upsert several documents in one transaction.
    async fn write_batch(&self, collection: Collection, docs: Vec<Document>) -> Result<()>;

    /// Fetch one document by key.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>>;

    /// Fetch all documents matching the filter, in no particular order.
    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>>;

    /// Count documents matching the filter.
    async fn count(&self, collection: Collection, filter: &Filter) -> Result<usize>;

    /// Hard-delete by key. Returns whether a row was removed.
    async fn delete(&self, collection: Collection, key: &str) -> Result<bool>;

    /// Release connections. Further calls may fail.
    async fn close(&self);
}

/// Initialize the backend selected by configuration.
pub async fn init_backend(config: &StorageConfig) -> Result<Arc<dyn LedgerBackend>> {
    info!(storage_type = ?config.storage_type, path = %config.path, "Initializing ledger storage");

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryLedgerBackend::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let backend = SqliteLedgerBackend::connect(&config.path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unsupported("sqlite".to_string()))
        }
    }
}
