//! In-memory remote store and change feed for testing.
//!
//! Upserts land in per-table maps and are echoed on the table's change feed,
//! the way a hosted realtime database echoes a device's own writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

use super::{ChangeFeed, RemoteEventRecord, RemoteStore};
use crate::sync::{ChangeMessage, ChangeType, RemoteTable, Result, SyncError};

const FEED_CAPACITY: usize = 256;

type FeedItem = std::result::Result<ChangeMessage, String>;

pub struct MockRemote {
    rows: RwLock<HashMap<RemoteTable, BTreeMap<String, Value>>>,
    events_feed: broadcast::Sender<FeedItem>,
    silos_feed: broadcast::Sender<FeedItem>,
    upsert_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    fail_on_upsert: RwLock<Option<SyncError>>,
    fail_on_subscribe: RwLock<bool>,
    upsert_delay: RwLock<Option<Duration>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            events_feed: broadcast::channel(FEED_CAPACITY).0,
            silos_feed: broadcast::channel(FEED_CAPACITY).0,
            upsert_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            fail_on_upsert: RwLock::new(None),
            fail_on_subscribe: RwLock::new(false),
            upsert_delay: RwLock::new(None),
        }
    }

    fn feed(&self, table: RemoteTable) -> &broadcast::Sender<FeedItem> {
        match table {
            RemoteTable::Events => &self.events_feed,
            RemoteTable::Silos => &self.silos_feed,
        }
    }

    /// Make every upsert fail with a transport error until cleared.
    pub async fn set_fail_on_upsert(&self, fail: bool) {
        *self.fail_on_upsert.write().await =
            fail.then(|| SyncError::Transport("injected upsert failure".to_string()));
    }

    /// Make every upsert fail with a remote rejection until cleared.
    pub async fn set_reject_upsert(&self, status: u16, message: impl Into<String>) {
        *self.fail_on_upsert.write().await = Some(SyncError::Remote {
            status,
            message: message.into(),
        });
    }

    pub async fn set_fail_on_subscribe(&self, fail: bool) {
        *self.fail_on_subscribe.write().await = fail;
    }

    /// Delay every upsert, to exercise push timeouts.
    pub async fn set_upsert_delay(&self, delay: Option<Duration>) {
        *self.upsert_delay.write().await = delay;
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub async fn rows(&self, table: RemoteTable) -> Vec<Value> {
        self.rows
            .read()
            .await
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row(&self, table: RemoteTable, key: &str) -> Option<Value> {
        self.rows
            .read()
            .await
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Store a row without notifying subscribers (a change missed while offline).
    pub async fn put_silent(&self, table: RemoteTable, row: Value) {
        if let Some(key) = row_key(table, &row) {
            self.rows.write().await.entry(table).or_default().insert(key, row);
        }
    }

    /// Store a row as another device would, notifying subscribers.
    pub async fn put(&self, table: RemoteTable, row: Value) {
        let Some(key) = row_key(table, &row) else {
            return;
        };
        let previous = self
            .rows
            .write()
            .await
            .entry(table)
            .or_default()
            .insert(key, row.clone());
        let change_type = if previous.is_some() {
            ChangeType::Update
        } else {
            ChangeType::Insert
        };
        self.emit(table, ChangeMessage::upsert(change_type, row));
    }

    /// Delete a row as another device would, notifying subscribers.
    pub async fn delete(&self, table: RemoteTable, key: &str) {
        let removed = self
            .rows
            .write()
            .await
            .get_mut(&table)
            .and_then(|rows| rows.remove(key));
        if removed.is_some() {
            let mut old = serde_json::Map::new();
            old.insert(table.key_field().to_string(), Value::String(key.to_string()));
            self.emit(table, ChangeMessage::delete(Value::Object(old)));
        }
    }

    /// Deliver a raw change message.
    pub fn emit(&self, table: RemoteTable, message: ChangeMessage) {
        let _ = self.feed(table).send(Ok(message));
    }

    /// Break every open subscription on the table with a transport error.
    pub fn inject_feed_error(&self, table: RemoteTable, reason: impl Into<String>) {
        let _ = self.feed(table).send(Err(reason.into()));
    }
}

fn row_key(table: RemoteTable, row: &Value) -> Option<String> {
    row.get(table.key_field())
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn upsert_events(&self, records: &[RemoteEventRecord]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = *self.upsert_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.fail_on_upsert.read().await.as_ref() {
            return Err(match err {
                SyncError::Remote { status, message } => SyncError::Remote {
                    status: *status,
                    message: message.clone(),
                },
                other => SyncError::Transport(other.to_string()),
            });
        }

        for record in records {
            let row = serde_json::to_value(record).map_err(|e| SyncError::Malformed(e.to_string()))?;
            self.put(RemoteTable::Events, row).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MockRemote {
    async fn subscribe(
        &self,
        table: RemoteTable,
    ) -> Result<BoxStream<'static, Result<ChangeMessage>>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_subscribe.read().await {
            return Err(SyncError::Transport("injected subscribe failure".to_string()));
        }

        let stream = BroadcastStream::new(self.feed(table).subscribe()).map(|item| match item {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(reason)) => Err(SyncError::Transport(reason)),
            Err(e) => Err(SyncError::Transport(e.to_string())),
        });
        Ok(stream.boxed())
    }

    async fn snapshot(&self, table: RemoteTable) -> Result<Vec<Value>> {
        Ok(self.rows(table).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_emits_insert_then_update() {
        let remote = MockRemote::new();
        let mut feed = remote.subscribe(RemoteTable::Silos).await.unwrap();

        remote.put(RemoteTable::Silos, json!({ "id": "s1", "name": "A" })).await;
        remote.put(RemoteTable::Silos, json!({ "id": "s1", "name": "B" })).await;

        assert_eq!(feed.next().await.unwrap().unwrap().change_type, ChangeType::Insert);
        assert_eq!(feed.next().await.unwrap().unwrap().change_type, ChangeType::Update);
        assert_eq!(remote.rows(RemoteTable::Silos).await.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_feed_error() {
        let remote = MockRemote::new();
        let mut feed = remote.subscribe(RemoteTable::Events).await.unwrap();
        remote.inject_feed_error(RemoteTable::Events, "socket closed");
        assert!(matches!(feed.next().await, Some(Err(SyncError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_delete_carries_key_in_old() {
        let remote = MockRemote::new();
        remote
            .put_silent(RemoteTable::Events, json!({ "event_id": "e1" }))
            .await;
        let mut feed = remote.subscribe(RemoteTable::Events).await.unwrap();
        remote.delete(RemoteTable::Events, "e1").await;

        let msg = feed.next().await.unwrap().unwrap();
        assert_eq!(msg.change_type, ChangeType::Delete);
        assert_eq!(msg.old.unwrap()["event_id"], "e1");
    }
}
