//! silo-ledger - offline-first silo inventory ledger
//!
//! An append-only event ledger of stock movements per silo, with balances
//! folded from events, live queries over committed changes, and
//! bidirectional sync against a shared remote store.

pub mod config;
pub mod model;
pub mod operations;
pub mod projector;
pub mod reactive;
pub mod runtime;
pub mod seed;
pub mod storage;
pub mod store;
pub mod sync;
pub mod utils;

pub use model::{EventKind, LedgerEvent, Quantity, Silo, SyncState, ValidationError};
pub use reactive::LiveQuery;
pub use storage::StorageError;
pub use store::{LedgerStore, Query};
