//! Analysis history per silo.

use crate::model::Analysis;
use crate::storage::Result;
use crate::store::{LedgerStore, Query};

/// All analyses of a silo, newest first.
pub async fn history(store: &LedgerStore, silo_id: &str) -> Result<Vec<Analysis>> {
    store.query(&Query::by_silo(silo_id).newest_first()).await
}

/// The newest analysis by `created_at`. The stored status tag is ignored.
pub async fn current_analysis(store: &LedgerStore, silo_id: &str) -> Result<Option<Analysis>> {
    Ok(history(store, silo_id).await?.into_iter().next())
}
