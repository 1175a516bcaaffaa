//! Typed ledger store.
//!
//! `LedgerStore` is the single shared mutable resource of the ledger. Every
//! component reads and writes through it, which keeps the commit
//! notifications in [`crate::reactive`] complete.
//!
//! Commits are serialized per collection: a write holds the collection's
//! write gate across validation, the backend write and the notification, and
//! every query holds the read gate. Subscribers therefore never observe a
//! partially applied commit, and notices within a collection arrive in commit
//! order.

mod record;

pub use record::{chronological, Query, Record, Sort};

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::model::{LedgerEvent, SyncState};
use crate::reactive::{ChangeNotifier, CommitOp};
use crate::storage::{
    init_backend, Collection, Filter, LedgerBackend, Result, StorageError, WriteMode,
};

/// Lifecycle of a store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Opening,
    Ready,
    Closed,
}

/// Per-collection commit gates.
struct Gates {
    events: RwLock<()>,
    silos: RwLock<()>,
    analyses: RwLock<()>,
}

pub struct LedgerStore {
    backend: Arc<dyn LedgerBackend>,
    notifier: ChangeNotifier,
    gates: Gates,
    state: watch::Sender<StoreState>,
}

impl LedgerStore {
    /// Wrap a backend. The store is not ready until [`LedgerStore::init`] runs.
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Arc<Self> {
        let (state, _) = watch::channel(StoreState::Opening);
        Arc::new(Self {
            backend,
            notifier: ChangeNotifier::new(),
            gates: Gates {
                events: RwLock::new(()),
                silos: RwLock::new(()),
                analyses: RwLock::new(()),
            },
            state,
        })
    }

    /// Open the backend selected by configuration and wait for its schema.
    pub async fn open(config: &StorageConfig) -> Result<Arc<Self>> {
        let backend = init_backend(config).await?;
        Self::with_backend(backend).await
    }

    /// Build a ready store over an existing backend.
    pub async fn with_backend(backend: Arc<dyn LedgerBackend>) -> Result<Arc<Self>> {
        let store = Self::new(backend);
        store.init().await?;
        Ok(store)
    }

    /// Create tables and mark the store ready.
    pub async fn init(&self) -> Result<()> {
        if *self.state.borrow() == StoreState::Closed {
            return Err(StorageError::Closed);
        }
        self.backend.init().await?;
        self.state.send_replace(StoreState::Ready);
        info!("Ledger store ready");
        Ok(())
    }

    /// Resolve once the store is ready. Fails if it was closed first.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != StoreState::Opening)
            .await
            .map_err(|_| StorageError::Closed)?;
        match *state {
            StoreState::Ready => Ok(()),
            _ => Err(StorageError::Closed),
        }
    }

    pub fn state(&self) -> StoreState {
        *self.state.borrow()
    }

    /// Close the backend. Every later operation fails with `StorageError::Closed`.
    pub async fn close(&self) {
        let previous = self.state.send_replace(StoreState::Closed);
        if previous != StoreState::Closed {
            self.backend.close().await;
            info!("Ledger store closed");
        }
    }

    /// Validate and append a new record. Fails with `Conflict` if the key exists.
    pub async fn insert<R: Record>(&self, record: R) -> Result<R> {
        self.ready().await?;
        record.validate()?;
        let doc = record.to_document()?;

        let _commit = self.gate(R::COLLECTION).write().await;
        self.ensure_open()?;
        self.backend
            .write(R::COLLECTION, doc, WriteMode::Insert)
            .await?;
        self.notifier
            .publish(R::COLLECTION, CommitOp::Insert, vec![record.key().to_string()]);

        debug!(collection = %R::COLLECTION, key = %record.key(), "Record inserted");
        Ok(record)
    }

    /// Insert or replace by primary key.
    ///
    /// Applying the same upsert twice leaves the same stored state and emits
    /// a single notification. An event that is already `SYNCED` stays so.
    pub async fn upsert<R: Record>(&self, record: R) -> Result<R> {
        self.ready().await?;
        record.validate()?;

        let _commit = self.gate(R::COLLECTION).write().await;
        self.ensure_open()?;

        let existing = self
            .backend
            .get(R::COLLECTION, record.key())
            .await?
            .map(R::from_document)
            .transpose()?;

        let record = match existing {
            Some(existing) => {
                let merged = record.reconcile(&existing);
                if merged == existing {
                    debug!(collection = %R::COLLECTION, key = %merged.key(), "Upsert unchanged");
                    return Ok(merged);
                }
                merged
            }
            None => record,
        };

        self.backend
            .write(R::COLLECTION, record.to_document()?, WriteMode::Upsert)
            .await?;
        self.notifier
            .publish(R::COLLECTION, CommitOp::Upsert, vec![record.key().to_string()]);

        debug!(collection = %R::COLLECTION, key = %record.key(), "Record upserted");
        Ok(record)
    }

    /// Current matching set, sorted per the query.
    pub async fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>> {
        self.ready().await?;
        let _read = self.gate(R::COLLECTION).read().await;
        self.query_unlocked(query).await
    }

    /// Run a query while the caller already holds the collection gate.
    pub(crate) async fn query_unlocked<R: Record>(&self, query: &Query) -> Result<Vec<R>> {
        self.ensure_open()?;
        let docs = self.backend.find(R::COLLECTION, &query.filter).await?;
        let mut records = docs
            .into_iter()
            .map(R::from_document)
            .collect::<Result<Vec<R>>>()?;
        query.sort_records(&mut records);
        Ok(records)
    }

    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>> {
        self.ready().await?;
        let _read = self.gate(R::COLLECTION).read().await;
        self.ensure_open()?;
        self.backend
            .get(R::COLLECTION, key)
            .await?
            .map(R::from_document)
            .transpose()
    }

    pub async fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        self.ready().await?;
        let _read = self.gate(collection).read().await;
        self.ensure_open()?;
        self.backend.count(collection, filter).await
    }

    /// Hard delete by key. Returns whether a row existed.
    ///
    /// Local code never removes events; only remote-delete propagation does.
    pub async fn remove(&self, collection: Collection, key: &str) -> Result<bool> {
        self.ready().await?;
        let _commit = self.gate(collection).write().await;
        self.ensure_open()?;

        let removed = self.backend.delete(collection, key).await?;
        if removed {
            self.notifier
                .publish(collection, CommitOp::Remove, vec![key.to_string()]);
            debug!(collection = %collection, key = %key, "Record removed");
        }
        Ok(removed)
    }

    /// Flip the given events from `PENDING` to `SYNCED` in one commit.
    ///
    /// Unknown ids and events already `SYNCED` are skipped. Returns the number
    /// of events that transitioned.
    pub async fn mark_synced(&self, event_ids: &[String]) -> Result<usize> {
        self.ready().await?;
        let _commit = self.gate(Collection::Events).write().await;
        self.ensure_open()?;

        let mut docs = Vec::with_capacity(event_ids.len());
        let mut keys = Vec::with_capacity(event_ids.len());
        for id in event_ids {
            let Some(doc) = self.backend.get(Collection::Events, id).await? else {
                continue;
            };
            let mut event = LedgerEvent::from_document(doc)?;
            if event.sync_state == SyncState::Synced {
                continue;
            }
            event.sync_state = SyncState::Synced;
            keys.push(event.event_id.clone());
            docs.push(event.to_document()?);
        }

        if docs.is_empty() {
            return Ok(0);
        }

        let count = docs.len();
        self.backend.write_batch(Collection::Events, docs).await?;
        self.notifier
            .publish(Collection::Events, CommitOp::MarkSynced, keys);

        debug!(count, "Events marked synced");
        Ok(count)
    }

    pub(crate) fn gate(&self, collection: Collection) -> &RwLock<()> {
        match collection {
            Collection::Events => &self.gates.events,
            Collection::Silos => &self.gates.silos,
            Collection::Analyses => &self.gates.analyses,
        }
    }

    pub(crate) fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    fn ensure_open(&self) -> Result<()> {
        match *self.state.borrow() {
            StoreState::Closed => Err(StorageError::Closed),
            _ => Ok(()),
        }
    }
}
