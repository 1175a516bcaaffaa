//! Inbound sync listener.
//!
//! Subscribes to the remote change feed of `events` and `silos` and applies
//! every change to the local store. Remote-origin events are stored `SYNCED`
//! so the outbound engine never resends them. Malformed changes are logged
//! and skipped; the subscription stays alive.
//!
//! State machine: `Disconnected -> Subscribing -> Subscribed`, and back to
//! `Disconnected` on any transport error. Reconnects wait on an exponential
//! backoff that resets after each successful subscription. Every successful
//! subscription is followed by a full resync of both tables, which closes
//! any insert or update gap left while disconnected. Deletes are applied only
//! from `DELETE` changes; the resync never removes local rows.

use std::sync::Arc;
use std::time::Duration;

use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::remote::ChangeFeed;
use super::{ChangeMessage, ChangeType, RemoteTable, Result, SyncError};
use crate::model::{EventKind, InputMethod, LedgerEvent, Quantity, Silo, SyncState};
use crate::storage::Collection;
use crate::store::LedgerStore;
use crate::utils::retry::{reconnect_backoff, Reconnect};

/// Delay used once a backoff schedule is exhausted.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Name given to remote silos that arrive without one.
const DEFAULT_SILO_NAME: &str = "Silo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Subscribing,
    Subscribed,
}

/// What applying one change did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Upserted,
    Removed,
    /// Delete of a row that does not exist locally.
    Absent,
    /// Malformed payload or store rejection; logged and ignored.
    Skipped,
}

type Changes = BoxStream<'static, Result<(RemoteTable, ChangeMessage)>>;

pub struct InboundSyncListener {
    store: Arc<LedgerStore>,
    feed: Arc<dyn ChangeFeed>,
    state: watch::Sender<ListenerState>,
    backoff: ExponentialBuilder,
}

impl InboundSyncListener {
    pub fn new(store: Arc<LedgerStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            store,
            feed,
            state,
            backoff: reconnect_backoff(),
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Inbound listener state changed");
        }
    }

    /// Apply one change to the local store. Never fails.
    pub async fn apply(&self, table: RemoteTable, change: &ChangeMessage) -> ApplyOutcome {
        let result = match change.change_type {
            ChangeType::Insert | ChangeType::Update => match &change.new {
                Some(row) => self.apply_upsert(table, row).await,
                None => Err(SyncError::Malformed("upsert without new row".to_string())),
            },
            ChangeType::Delete => self.apply_delete(table, change).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(table = %table, change = ?change.change_type, error = %e, "Skipping remote change");
                ApplyOutcome::Skipped
            }
        }
    }

    async fn apply_upsert(&self, table: RemoteTable, row: &Value) -> Result<ApplyOutcome> {
        match table {
            RemoteTable::Events => {
                let mut event = parse_event(row)?;
                event.sync_state = SyncState::Synced;
                self.store.upsert(event).await?;
            }
            RemoteTable::Silos => {
                self.store.upsert(parse_silo(row)?).await?;
            }
        }
        Ok(ApplyOutcome::Upserted)
    }

    async fn apply_delete(&self, table: RemoteTable, change: &ChangeMessage) -> Result<ApplyOutcome> {
        let key = change
            .old
            .as_ref()
            .or(change.new.as_ref())
            .and_then(|row| str_field(row, table.key_field()))
            .ok_or_else(|| SyncError::Malformed(format!("delete without '{}'", table.key_field())))?;

        let removed = self.store.remove(collection(table), &key).await?;
        Ok(if removed {
            ApplyOutcome::Removed
        } else {
            ApplyOutcome::Absent
        })
    }

    /// Upsert every remote row of both tables.
    ///
    /// Nothing is removed here: a listing that comes back short must never
    /// cost local history. Remote deletes arrive as `DELETE` changes only.
    ///
    /// Returns the number of rows upserted.
    pub async fn resync(&self) -> Result<usize> {
        let mut upserted = 0;

        for table in RemoteTable::ALL {
            let rows = self.feed.snapshot(table).await?;
            for row in rows {
                let change = ChangeMessage::upsert(ChangeType::Update, row);
                if self.apply(table, &change).await == ApplyOutcome::Upserted {
                    upserted += 1;
                }
            }
        }

        info!(upserted, "Inbound resync complete");
        Ok(upserted)
    }

    /// Subscribe to both tables as one merged stream.
    async fn connect(&self) -> Result<Changes> {
        let mut streams = Vec::with_capacity(RemoteTable::ALL.len());
        for table in RemoteTable::ALL {
            let changes = self.feed.subscribe(table).await?;
            streams.push(
                changes
                    .map(move |item| item.map(|change| (table, change)))
                    .boxed(),
            );
        }
        Ok(stream::select_all(streams).boxed())
    }

    /// Consume changes until the stream fails or shutdown is requested.
    /// Returns true on shutdown.
    async fn run_session(&self, mut changes: Changes, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return true;
                    }
                }
                next = changes.next() => match next {
                    Some(Ok((table, change))) => {
                        let outcome = self.apply(table, &change).await;
                        debug!(table = %table, change = ?change.change_type, ?outcome, "Remote change applied");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Change feed dropped");
                        return false;
                    }
                    None => {
                        warn!("Change feed ended");
                        return false;
                    }
                },
            }
        }
    }

    /// Subscribe, resync and apply changes, reconnecting with backoff, until
    /// `shutdown` turns true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Inbound sync started");
        let mut reconnect = Reconnect::new(self.backoff.clone(), MAX_RECONNECT_DELAY);

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ListenerState::Subscribing);
            match self.connect().await {
                Ok(changes) => {
                    self.set_state(ListenerState::Subscribed);
                    reconnect.reset();
                    info!("Change feed subscribed");

                    if let Err(e) = self.resync().await {
                        warn!(error = %e, "Inbound resync failed");
                    }
                    if self.run_session(changes, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Change feed subscribe failed");
                }
            }

            self.set_state(ListenerState::Disconnected);
            let delay = reconnect.next_delay();
            debug!(?delay, "Reconnecting change feed");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ListenerState::Disconnected);
        info!("Inbound sync stopped");
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn collection(table: RemoteTable) -> Collection {
    match table {
        RemoteTable::Events => Collection::Events,
        RemoteTable::Silos => Collection::Silos,
    }
}

fn str_field(row: &Value, field: &str) -> Option<String> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn quantity_field(row: &Value, field: &str) -> Result<Option<Quantity>> {
    let kg = match row.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    kg.and_then(Quantity::from_kg)
        .map(Some)
        .ok_or_else(|| SyncError::Malformed(format!("'{field}' is not a quantity")))
}

fn time_field(row: &Value, field: &str) -> Option<DateTime<Utc>> {
    row.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Build an event from a remote row, defaulting every absent field but the key.
fn parse_event(row: &Value) -> Result<LedgerEvent> {
    let event_id = str_field(row, "event_id")
        .ok_or_else(|| SyncError::Malformed("event without 'event_id'".to_string()))?;

    let kind = match str_field(row, "kind") {
        Some(kind) => kind
            .parse::<EventKind>()
            .map_err(|e| SyncError::Malformed(e.to_string()))?,
        None => EventKind::Usage,
    };
    let input_method = match str_field(row, "input_method") {
        Some(method) => method
            .parse::<InputMethod>()
            .map_err(|e| SyncError::Malformed(e.to_string()))?,
        None => InputMethod::ManualKg,
    };

    let created_at = time_field(row, "created_at").unwrap_or_else(Utc::now);
    Ok(LedgerEvent {
        event_id,
        silo_id: str_field(row, "silo_id").unwrap_or_default(),
        actor_id: str_field(row, "actor_id"),
        kind,
        quantity_delta: quantity_field(row, "quantity_delta")?.unwrap_or(Quantity::ZERO),
        input_method,
        created_at,
        updated_at: time_field(row, "updated_at").unwrap_or(created_at),
        sync_state: SyncState::Synced,
    })
}

/// Build a silo from a remote row, defaulting every absent field but the key.
fn parse_silo(row: &Value) -> Result<Silo> {
    let id = str_field(row, "id")
        .ok_or_else(|| SyncError::Malformed("silo without 'id'".to_string()))?;

    Ok(Silo {
        id,
        name: str_field(row, "name").unwrap_or_else(|| DEFAULT_SILO_NAME.to_string()),
        silo_type: str_field(row, "type"),
        content_type: str_field(row, "content_type"),
        capacity: quantity_field(row, "capacity")?,
        location: str_field(row, "location"),
        created_at: time_field(row, "created_at").unwrap_or_else(Utc::now),
    })
}
