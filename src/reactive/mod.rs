//! Reactive query layer.
//!
//! Every committed mutation publishes a [`CommitNotice`] on its collection's
//! broadcast channel. A [`LiveQuery`] listens on that channel, re-runs its
//! query after each notice and forwards the new result set when it differs
//! from the last one delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::storage::{Collection, Result, StorageError};
use crate::store::{LedgerStore, Query, Record, StoreState};

/// Notices buffered per collection before slow subscribers lag.
const NOTICE_CAPACITY: usize = 256;

/// Result sets buffered per live query.
const UPDATE_CAPACITY: usize = 16;

/// Kind of committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOp {
    Insert,
    Upsert,
    Remove,
    MarkSynced,
}

/// One committed mutation on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNotice {
    pub collection: Collection,
    pub op: CommitOp,
    pub keys: Vec<String>,
    /// Store-wide commit sequence number.
    pub seq: u64,
}

/// Per-collection publish-subscribe registry of commit notices.
pub struct ChangeNotifier {
    events: broadcast::Sender<Arc<CommitNotice>>,
    silos: broadcast::Sender<Arc<CommitNotice>>,
    analyses: broadcast::Sender<Arc<CommitNotice>>,
    seq: AtomicU64,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            events: broadcast::channel(NOTICE_CAPACITY).0,
            silos: broadcast::channel(NOTICE_CAPACITY).0,
            analyses: broadcast::channel(NOTICE_CAPACITY).0,
            seq: AtomicU64::new(0),
        }
    }

    fn sender(&self, collection: Collection) -> &broadcast::Sender<Arc<CommitNotice>> {
        match collection {
            Collection::Events => &self.events,
            Collection::Silos => &self.silos,
            Collection::Analyses => &self.analyses,
        }
    }

    /// Publish a notice. Having no subscribers is not an error.
    pub fn publish(&self, collection: Collection, op: CommitOp, keys: Vec<String>) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let notice = Arc::new(CommitNotice {
            collection,
            op,
            keys,
            seq,
        });
        let receivers = self.sender(collection).send(notice).unwrap_or(0);
        debug!(collection = %collection, ?op, seq, receivers, "Commit notice published");
        seq
    }

    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Arc<CommitNotice>> {
        self.sender(collection).subscribe()
    }
}

/// Aborts the refresh task when the live query is dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An initial result set plus every later result set of the same query.
pub struct LiveQuery<R> {
    latest: Vec<R>,
    updates: mpsc::Receiver<Vec<R>>,
    _task: TaskGuard,
}

impl<R: Record> LiveQuery<R> {
    /// The most recent result set: the initial snapshot until `next` yields.
    pub fn snapshot(&self) -> &[R] {
        &self.latest
    }

    /// Wait for the next changed result set. `None` once the store is
    /// closed or dropped.
    pub async fn next(&mut self) -> Option<Vec<R>> {
        let update = self.updates.recv().await?;
        self.latest = update.clone();
        Some(update)
    }

    /// Convert into a stream of changed result sets.
    pub fn into_stream(self) -> BoxStream<'static, Vec<R>> {
        stream::unfold(self, |mut live| async move {
            live.next().await.map(|update| (update, live))
        })
        .boxed()
    }
}

impl LedgerStore {
    /// Register a live query on `R`'s collection.
    ///
    /// The notice subscription is taken under the collection's read gate
    /// before the initial query runs, so no commit can fall between the
    /// snapshot and the first update.
    pub async fn subscribe<R: Record>(self: &Arc<Self>, query: Query) -> Result<LiveQuery<R>> {
        self.ready().await?;

        let (notices, snapshot) = {
            let _read = self.gate(R::COLLECTION).read().await;
            let notices = self.notifier().subscribe(R::COLLECTION);
            let snapshot: Vec<R> = self.query_unlocked(&query).await?;
            (notices, snapshot)
        };

        let (tx, rx) = mpsc::channel(UPDATE_CAPACITY);
        let task = tokio::spawn(refresh_loop(
            Arc::downgrade(self),
            self.watch_state(),
            notices,
            query,
            snapshot.clone(),
            tx,
        ));

        debug!(collection = %R::COLLECTION, "Live query registered");
        Ok(LiveQuery {
            latest: snapshot,
            updates: rx,
            _task: TaskGuard(task),
        })
    }
}

async fn refresh_loop<R: Record>(
    store: Weak<LedgerStore>,
    mut state: watch::Receiver<StoreState>,
    mut notices: broadcast::Receiver<Arc<CommitNotice>>,
    query: Query,
    mut last: Vec<R>,
    tx: mpsc::Sender<Vec<R>>,
) {
    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(collection = %R::COLLECTION, skipped, "Live query lagged, re-querying");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == StoreState::Closed {
                    break;
                }
                continue;
            }
            _ = tx.closed() => break,
        }

        let Some(store) = store.upgrade() else {
            break;
        };
        let result = store.query::<R>(&query).await;
        drop(store);

        match result {
            Ok(current) if current != last => {
                last = current.clone();
                if tx.send(current).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(StorageError::Closed) => break,
            Err(e) => {
                warn!(collection = %R::COLLECTION, error = %e, "Live query refresh failed");
            }
        }
    }
}
