//! Bidirectional sync between the local ledger and the remote store.
//!
//! - [`outbound::OutboundSyncEngine`]: drains `PENDING` events to the remote upsert
//! - [`inbound::InboundSyncListener`]: applies remote changes to the local store
//!
//! Sync errors never reach operators. They are logged and manifest only as
//! events that stay `PENDING`.

pub mod inbound;
pub mod outbound;
pub mod remote;

pub use inbound::{ApplyOutcome, InboundSyncListener, ListenerState};
pub use outbound::{OutboundSyncEngine, PushOutcome};
pub use remote::{ChangeFeed, ParentResolver, RemoteEventRecord, RemoteStore, StaticParentResolver};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors from the sync layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote rejected request: status={status}, message={message}")]
    Remote { status: u16, message: String },

    #[error("No remote parent for silo '{silo_id}'")]
    Resolution { silo_id: String },

    #[error("Malformed remote payload: {0}")]
    Malformed(String),

    #[error("Local store error: {0}")]
    Store(#[from] StorageError),
}

impl SyncError {
    /// Missing remote reference data rather than a network problem.
    pub fn is_resolution(&self) -> bool {
        matches!(self, SyncError::Resolution { .. })
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

/// Remote tables mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteTable {
    Events,
    Silos,
}

impl RemoteTable {
    pub const ALL: [RemoteTable; 2] = [RemoteTable::Events, RemoteTable::Silos];

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteTable::Events => "events",
            RemoteTable::Silos => "silos",
        }
    }

    /// Primary key column of the table.
    pub fn key_field(&self) -> &'static str {
        match self {
            RemoteTable::Events => "event_id",
            RemoteTable::Silos => "id",
        }
    }
}

impl fmt::Display for RemoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// One change-feed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    pub change_type: ChangeType,
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl ChangeMessage {
    pub fn upsert(change_type: ChangeType, row: serde_json::Value) -> Self {
        Self {
            change_type,
            new: Some(row),
            old: None,
        }
    }

    pub fn delete(old: serde_json::Value) -> Self {
        Self {
            change_type: ChangeType::Delete,
            new: None,
            old: Some(old),
        }
    }
}
