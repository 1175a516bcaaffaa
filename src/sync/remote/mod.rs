//! Remote store seams.
//!
//! - `RemoteStore`: idempotent batch upsert of events keyed by `event_id`
//! - `ChangeFeed`: per-table change stream plus a full-table snapshot
//! - `ParentResolver`: remote foreign key lookup by `silo_id`
//!
//! Implementations: HTTP (PostgREST-style REST), in-memory mock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::{ChangeMessage, RemoteTable, Result};
use crate::model::{EventKind, InputMethod, LedgerEvent, Quantity};

#[cfg(feature = "http")]
pub mod http;
pub mod mock;

#[cfg(feature = "http")]
pub use http::HttpRemote;
pub use mock::MockRemote;

/// Event as submitted to the remote store. `sync_state` is local-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEventRecord {
    pub event_id: String,
    pub silo_id: String,
    pub actor_id: Option<String>,
    pub kind: EventKind,
    pub quantity_delta: Quantity,
    pub input_method: InputMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Remote grouping entity, when the remote schema requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl RemoteEventRecord {
    pub fn from_event(event: &LedgerEvent, parent_id: Option<String>) -> Self {
        Self {
            event_id: event.event_id.clone(),
            silo_id: event.silo_id.clone(),
            actor_id: event.actor_id.clone(),
            kind: event.kind,
            quantity_delta: event.quantity_delta,
            input_method: event.input_method,
            created_at: event.created_at,
            updated_at: event.updated_at,
            parent_id,
        }
    }
}

/// Batch upsert endpoint of the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace every record by `event_id`. Resubmission is harmless.
    async fn upsert_events(&self, records: &[RemoteEventRecord]) -> Result<()>;
}

/// Remote change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a change stream for one table. The stream ends or yields an error
    /// when the transport drops.
    async fn subscribe(&self, table: RemoteTable)
        -> Result<BoxStream<'static, Result<ChangeMessage>>>;

    /// Current rows of the table, for resync after a gap. Used for upserts
    /// only, so a short listing never removes local rows.
    async fn snapshot(&self, table: RemoteTable) -> Result<Vec<serde_json::Value>>;
}

/// Resolves the remote parent id a silo's events must carry.
#[async_trait]
pub trait ParentResolver: Send + Sync {
    async fn resolve(&self, silo_id: &str) -> Result<Option<String>>;
}

/// Parent ids from a fixed map, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticParentResolver {
    parents: HashMap<String, String>,
}

impl StaticParentResolver {
    pub fn new(parents: HashMap<String, String>) -> Self {
        Self { parents }
    }

    pub fn with(mut self, silo_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        self.parents.insert(silo_id.into(), parent_id.into());
        self
    }
}

#[async_trait]
impl ParentResolver for StaticParentResolver {
    async fn resolve(&self, silo_id: &str) -> Result<Option<String>> {
        Ok(self.parents.get(silo_id).cloned())
    }
}
