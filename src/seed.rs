//! Initial silo seeding for a fresh device.

use tracing::info;

use crate::model::Silo;
use crate::storage::{Collection, Filter, Result};
use crate::store::LedgerStore;

/// Insert `silos` only if the local silo collection is empty.
///
/// Returns the number of silos inserted; zero when the collection already
/// holds data.
pub async fn seed_silos(store: &LedgerStore, silos: Vec<Silo>) -> Result<usize> {
    if silos.is_empty() {
        return Ok(0);
    }

    let existing = store.count(Collection::Silos, &Filter::All).await?;
    if existing > 0 {
        info!(existing, "Silo collection not empty, skipping seed");
        return Ok(0);
    }

    let mut inserted = 0;
    for silo in silos {
        store.upsert(silo).await?;
        inserted += 1;
    }

    info!(count = inserted, "Seeded silos");
    Ok(inserted)
}
