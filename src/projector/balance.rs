//! Silo balance: a fold over the silo's events.
//!
//! No balance is ever stored. Every read recomputes the sum from the event
//! set, so two devices appending events never have a balance field to merge.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;

use crate::model::{LedgerEvent, Quantity, Silo};
use crate::storage::Result;
use crate::store::{LedgerStore, Query};

/// Sum of `quantity_delta`. Exact integer addition, so order does not matter.
pub fn fold_balance<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Quantity {
    events.into_iter().map(|e| e.quantity_delta).sum()
}

/// Fill percentage clamped to `[0, 100]`. `None` when capacity is unknown or not positive.
pub fn occupancy(balance: Quantity, capacity: Option<Quantity>) -> Option<f64> {
    let capacity = capacity.filter(|c| c.is_positive())?;
    let pct = balance.grams() as f64 * 100.0 / capacity.grams() as f64;
    Some(pct.clamp(0.0, 100.0))
}

/// Balance read-out for one silo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiloBalance {
    pub silo_id: String,
    pub balance: Quantity,
    pub event_count: usize,
    /// `None` when the silo has no usable capacity.
    pub occupancy: Option<f64>,
}

pub struct BalanceProjector {
    store: Arc<LedgerStore>,
}

impl BalanceProjector {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, silo_id: &str) -> Result<Quantity> {
        let events: Vec<LedgerEvent> = self.store.query(&Query::by_silo(silo_id)).await?;
        Ok(fold_balance(&events))
    }

    /// Balance plus occupancy against the silo's current capacity.
    pub async fn summary(&self, silo_id: &str) -> Result<SiloBalance> {
        let events: Vec<LedgerEvent> = self.store.query(&Query::by_silo(silo_id)).await?;
        let silo: Option<Silo> = self.store.get(silo_id).await?;
        let balance = fold_balance(&events);

        Ok(SiloBalance {
            silo_id: silo_id.to_string(),
            balance,
            event_count: events.len(),
            occupancy: occupancy(balance, silo.and_then(|s| s.capacity)),
        })
    }

    /// Current balance plus a stream of every later changed balance.
    pub async fn watch(&self, silo_id: &str) -> Result<(Quantity, BoxStream<'static, Quantity>)> {
        let live = self
            .store
            .subscribe::<LedgerEvent>(Query::by_silo(silo_id))
            .await?;
        let current = fold_balance(live.snapshot());

        let mut last = current;
        let updates = live
            .into_stream()
            .map(|events| fold_balance(&events))
            .filter(move |balance| {
                let changed = *balance != last;
                last = *balance;
                futures::future::ready(changed)
            })
            .boxed();

        Ok((current, updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventKind, InputMethod};
    use crate::storage::MemoryLedgerBackend;
    use std::time::Duration;
    use tokio::time::timeout;

    fn event(silo: &str, kind: EventKind, kg: i64) -> LedgerEvent {
        LedgerEvent::new(silo, kind, Quantity::from_whole_kg(kg), InputMethod::ManualKg, None)
    }

    #[test]
    fn test_empty_fold_is_zero() {
        assert_eq!(fold_balance(&Vec::<LedgerEvent>::new()), Quantity::ZERO);
    }

    #[test]
    fn test_occupancy_clamps() {
        let cap = Some(Quantity::from_whole_kg(1_000));
        assert_eq!(occupancy(Quantity::from_whole_kg(250), cap), Some(25.0));
        assert_eq!(occupancy(Quantity::from_whole_kg(2_000), cap), Some(100.0));
        assert_eq!(occupancy(Quantity::from_whole_kg(-50), cap), Some(0.0));
        assert_eq!(occupancy(Quantity::from_whole_kg(50), None), None);
        assert_eq!(occupancy(Quantity::from_whole_kg(50), Some(Quantity::ZERO)), None);
        assert_eq!(
            occupancy(Quantity::from_whole_kg(50), Some(Quantity::from_whole_kg(-10))),
            None
        );
    }

    #[tokio::test]
    async fn test_balance_and_summary() {
        let store = LedgerStore::with_backend(Arc::new(MemoryLedgerBackend::new()))
            .await
            .unwrap();
        store
            .upsert(Silo::new("s1", "Trench").with_capacity(Quantity::from_whole_kg(1_000)))
            .await
            .unwrap();
        store.insert(event("s1", EventKind::Loading, 1_000)).await.unwrap();
        store.insert(event("s1", EventKind::Usage, -300)).await.unwrap();
        store.insert(event("s2", EventKind::Loading, 50)).await.unwrap();

        let projector = BalanceProjector::new(store);
        assert_eq!(projector.balance("s1").await.unwrap(), Quantity::from_whole_kg(700));
        assert_eq!(projector.balance("nope").await.unwrap(), Quantity::ZERO);

        let summary = projector.summary("s1").await.unwrap();
        assert_eq!(summary.event_count, 2);
        assert_eq!(summary.occupancy, Some(70.0));
    }

    #[tokio::test]
    async fn test_watch_emits_new_balance() {
        let store = LedgerStore::with_backend(Arc::new(MemoryLedgerBackend::new()))
            .await
            .unwrap();
        let projector = BalanceProjector::new(store.clone());

        let (current, mut updates) = projector.watch("s1").await.unwrap();
        assert_eq!(current, Quantity::ZERO);

        store.insert(event("s1", EventKind::Loading, 400)).await.unwrap();
        let next = timeout(Duration::from_secs(2), updates.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, Quantity::from_whole_kg(400));
    }
}
