//! Outbound sync engine.
//!
//! Drains `PENDING` events to the remote store in one idempotent upsert per
//! push and marks exactly the submitted events `SYNCED` once the remote call
//! returns success. Any failure leaves the batch `PENDING` for the next
//! trigger; resubmitting an acknowledged event is a no-op remotely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::remote::{ParentResolver, RemoteEventRecord, RemoteStore};
use super::{Result, SyncError};
use crate::config::SyncConfig;
use crate::model::{LedgerEvent, SyncState};
use crate::storage::{Collection, Filter, StorageError};
use crate::store::{LedgerStore, Query};

/// Result of one push attempt. Sync failures never propagate as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nothing was pending; no remote call was made.
    Idle,
    /// The remote acknowledged `count` events.
    Pushed { count: usize },
    /// The batch stays pending.
    Failed { pending: usize, reason: String },
}

pub struct OutboundSyncEngine {
    store: Arc<LedgerStore>,
    remote: Arc<dyn RemoteStore>,
    resolver: Option<Arc<dyn ParentResolver>>,
    push_timeout: Duration,
    push_interval: Duration,
    in_flight: Mutex<()>,
    trigger: Notify,
}

impl OutboundSyncEngine {
    pub fn new(store: Arc<LedgerStore>, remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            remote,
            resolver: None,
            push_timeout: config.push_timeout(),
            push_interval: config.push_interval(),
            in_flight: Mutex::new(()),
            trigger: Notify::new(),
        }
    }

    /// Require a remote parent id per silo. Batches with an unresolvable silo fail whole.
    pub fn with_resolver(mut self, resolver: Arc<dyn ParentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_timeout(mut self, push_timeout: Duration) -> Self {
        self.push_timeout = push_timeout;
        self
    }

    /// Number of events awaiting remote acknowledgment.
    pub async fn pending_count(&self) -> std::result::Result<usize, StorageError> {
        self.store
            .count(Collection::Events, &Filter::BySyncState(SyncState::Pending))
            .await
    }

    /// Request a push from the running loop (manual retry).
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Push every pending event once. Concurrent calls run one at a time.
    pub async fn push_pending(&self) -> PushOutcome {
        let _in_flight = self.in_flight.lock().await;

        match self.try_push().await {
            Ok(0) => PushOutcome::Idle,
            Ok(count) => PushOutcome::Pushed { count },
            Err(e) => {
                if e.is_resolution() {
                    error!(error = %e, "Outbound sync blocked by unresolved remote parent");
                } else {
                    warn!(error = %e, "Outbound sync failed, events stay pending");
                }
                let pending = self.pending_count().await.unwrap_or(0);
                PushOutcome::Failed {
                    pending,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_push(&self) -> Result<usize> {
        let pending: Vec<LedgerEvent> = self.store.query(&Query::pending()).await?;
        if pending.is_empty() {
            debug!("No pending events");
            return Ok(0);
        }

        let records = self.build_batch(&pending).await?;

        timeout(self.push_timeout, self.remote.upsert_events(&records))
            .await
            .map_err(|_| SyncError::Timeout(self.push_timeout))??;

        let ids: Vec<String> = records.iter().map(|r| r.event_id.clone()).collect();
        let marked = self.store.mark_synced(&ids).await?;

        info!(submitted = records.len(), marked, "Pending events synced");
        Ok(records.len())
    }

    async fn build_batch(&self, events: &[LedgerEvent]) -> Result<Vec<RemoteEventRecord>> {
        let Some(resolver) = &self.resolver else {
            return Ok(events
                .iter()
                .map(|e| RemoteEventRecord::from_event(e, None))
                .collect());
        };

        let mut parents: HashMap<&str, String> = HashMap::new();
        let mut records = Vec::with_capacity(events.len());
        for event in events {
            let parent = match parents.get(event.silo_id.as_str()) {
                Some(parent) => parent.clone(),
                None => {
                    let parent = resolver.resolve(&event.silo_id).await?.ok_or_else(|| {
                        SyncError::Resolution {
                            silo_id: event.silo_id.clone(),
                        }
                    })?;
                    parents.insert(&event.silo_id, parent.clone());
                    parent
                }
            };
            records.push(RemoteEventRecord::from_event(event, Some(parent)));
        }
        Ok(records)
    }

    /// Push now, then every `push_interval` and on every [`trigger`](Self::trigger),
    /// until `shutdown` turns true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.push_interval, "Outbound sync started");
        self.push_pending().await;

        let mut ticker = interval_at(Instant::now() + self.push_interval, self.push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.push_pending().await;
                }
                _ = self.trigger.notified() => {
                    debug!("Manual sync triggered");
                    self.push_pending().await;
                }
            }
        }

        info!("Outbound sync stopped");
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
