//! Typed records and the queries over them.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{Analysis, LedgerEvent, Silo, SyncState, ValidationError};
use crate::storage::{Collection, Document, Filter, Result};

/// A value type stored in one ledger collection.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Primary key.
    fn key(&self) -> &str;

    /// Owning silo, used for `Filter::BySilo`.
    fn silo_id(&self) -> Option<&str>;

    fn sync_state(&self) -> Option<SyncState> {
        None
    }

    fn created_at(&self) -> DateTime<Utc>;

    fn validate(&self) -> std::result::Result<(), ValidationError>;

    /// Combine an incoming upsert with the stored version of the same key.
    fn reconcile(self, _existing: &Self) -> Self {
        self
    }

    fn to_document(&self) -> Result<Document> {
        Ok(Document {
            key: self.key().to_string(),
            silo_id: self.silo_id().map(str::to_string),
            sync_state: self.sync_state(),
            created_at: self.created_at(),
            body: serde_json::to_value(self)?,
        })
    }

    fn from_document(doc: Document) -> Result<Self> {
        Ok(serde_json::from_value(doc.body)?)
    }
}

impl Record for LedgerEvent {
    const COLLECTION: Collection = Collection::Events;

    fn key(&self) -> &str {
        &self.event_id
    }

    fn silo_id(&self) -> Option<&str> {
        Some(&self.silo_id)
    }

    fn sync_state(&self) -> Option<SyncState> {
        Some(self.sync_state)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        LedgerEvent::validate(self)
    }

    // An acknowledged event stays acknowledged.
    fn reconcile(mut self, existing: &Self) -> Self {
        self.sync_state = self.sync_state.merge(existing.sync_state);
        self
    }
}

impl Record for Silo {
    const COLLECTION: Collection = Collection::Silos;

    fn key(&self) -> &str {
        &self.id
    }

    fn silo_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Silo::validate(self)
    }
}

impl Record for Analysis {
    const COLLECTION: Collection = Collection::Analyses;

    fn key(&self) -> &str {
        &self.id
    }

    fn silo_id(&self) -> Option<&str> {
        Some(&self.silo_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Analysis::validate(self)
    }
}

/// Result ordering on `created_at`. Ties break on the primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Sort {
    #[default]
    CreatedAsc,
    CreatedDesc,
}

/// A selector plus sort over one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    pub filter: Filter,
    pub sort: Sort,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_silo(silo_id: impl Into<String>) -> Self {
        Self {
            filter: Filter::BySilo(silo_id.into()),
            sort: Sort::default(),
        }
    }

    pub fn by_sync_state(state: SyncState) -> Self {
        Self {
            filter: Filter::BySyncState(state),
            sort: Sort::default(),
        }
    }

    /// Events not yet acknowledged by the remote store.
    pub fn pending() -> Self {
        Self::by_sync_state(SyncState::Pending)
    }

    pub fn newest_first(mut self) -> Self {
        self.sort = Sort::CreatedDesc;
        self
    }

    pub(crate) fn sort_records<R: Record>(&self, records: &mut [R]) {
        records.sort_by(|a, b| match self.sort {
            Sort::CreatedAsc => chronological(a, b),
            Sort::CreatedDesc => chronological(b, a),
        });
    }
}

/// Compare two records by (created_at, key).
pub fn chronological<R: Record>(a: &R, b: &R) -> Ordering {
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.key().cmp(b.key()))
}
