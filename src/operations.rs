//! Operator actions that append events to the ledger.

use std::sync::Arc;

use tracing::info;

use crate::model::{ConversionFactors, Entry, EventKind, LedgerEvent, Silo, ValidationError};
use crate::storage::Result;
use crate::store::LedgerStore;

/// A stock movement as the operator names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Material added. Recorded positive.
    Loading,
    /// Material fed out. Recorded negative.
    Usage,
    /// Spoiled material thrown away. Recorded as a negative adjustment.
    Discard,
    /// Correction after a physical count. The entry's sign is kept.
    Adjustment,
}

impl Action {
    fn kind(self) -> EventKind {
        match self {
            Action::Loading => EventKind::Loading,
            Action::Usage => EventKind::Usage,
            Action::Discard | Action::Adjustment => EventKind::Adjustment,
        }
    }
}

/// Appends operator actions for one actor.
pub struct OperatorActions {
    store: Arc<LedgerStore>,
    factors: ConversionFactors,
    actor_id: Option<String>,
}

impl OperatorActions {
    pub fn new(store: Arc<LedgerStore>, factors: ConversionFactors) -> Self {
        Self {
            store,
            factors,
            actor_id: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Convert the entry, apply the action's sign and append a `PENDING` event.
    pub async fn record(&self, silo_id: &str, action: Action, entry: Entry) -> Result<LedgerEvent> {
        if self.store.get::<Silo>(silo_id).await?.is_none() {
            return Err(ValidationError::UnknownSilo(silo_id.to_string()).into());
        }

        let (negative, magnitude) = split_sign(entry);
        let (quantity, method) = self.factors.to_quantity(magnitude)?;
        let delta = match action {
            Action::Loading => quantity,
            Action::Usage | Action::Discard => -quantity,
            Action::Adjustment if negative => -quantity,
            Action::Adjustment => quantity,
        };

        let event = LedgerEvent::new(silo_id, action.kind(), delta, method, self.actor_id.clone());
        let event = self.store.insert(event).await?;

        info!(
            silo_id = %silo_id,
            event_id = %event.event_id,
            kind = %event.kind,
            delta = %event.quantity_delta,
            "Operator action recorded"
        );
        Ok(event)
    }
}

fn split_sign(entry: Entry) -> (bool, Entry) {
    match entry {
        Entry::Kilograms(v) => (v < 0.0, Entry::Kilograms(v.abs())),
        Entry::Buckets(v) => (v < 0.0, Entry::Buckets(v.abs())),
        Entry::Wagons(v) => (v < 0.0, Entry::Wagons(v.abs())),
    }
}
