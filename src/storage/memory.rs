//! In-memory ledger backend.
//!
//! Holds every collection in ordered maps. Used for tests and for
//! `storage.type: memory`; nothing survives a restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Collection, Document, Filter, LedgerBackend, Result, StorageError, WriteMode};

#[derive(Default)]
pub struct MemoryLedgerBackend {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MemoryLedgerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Make every subsequent read fail with a backend error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedgerBackend {
    async fn init(&self) -> Result<()> {
        let mut collections = self.collections.write().await;
        for collection in Collection::ALL {
            collections.entry(collection).or_default();
        }
        Ok(())
    }

    async fn write(&self, collection: Collection, doc: Document, mode: WriteMode) -> Result<()> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection).or_default();

        if mode == WriteMode::Insert && rows.contains_key(&doc.key) {
            return Err(StorageError::Conflict {
                collection,
                key: doc.key,
            });
        }
        rows.insert(doc.key.clone(), doc);
        Ok(())
    }

    async fn write_batch(&self, collection: Collection, docs: Vec<Document>) -> Result<()> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection).or_default();
        for doc in docs {
            rows.insert(doc.key.clone(), doc);
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|rows| rows.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|rows| rows.values().filter(|d| filter.matches(d)).count())
            .unwrap_or(0))
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&collection)
            .map(|rows| rows.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn close(&self) {}
}
