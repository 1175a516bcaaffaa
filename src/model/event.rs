//! Ledger events: immutable quantity changes applied to a silo.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quantity::Quantity;
use super::validation::{require_key, ValidationError, MAX_KEY_LEN};

const COLLECTION: &str = "events";

/// What kind of stock movement an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Material added to the silo. Always positive.
    Loading,
    /// Material consumed from the silo. Always negative.
    Usage,
    /// Manual correction, either sign. `COMPENSATION` is the legacy name
    /// for a discard and is read as an adjustment.
    #[serde(alias = "COMPENSATION")]
    Adjustment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Loading => "LOADING",
            EventKind::Usage => "USAGE",
            EventKind::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOADING" => Ok(EventKind::Loading),
            "USAGE" => Ok(EventKind::Usage),
            "ADJUSTMENT" | "COMPENSATION" => Ok(EventKind::Adjustment),
            other => Err(ValidationError::UnknownVariant {
                collection: COLLECTION,
                field: "kind",
                value: other.to_string(),
            }),
        }
    }
}

/// How the operator entered the quantity. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputMethod {
    #[default]
    ManualKg,
    BucketCount,
    WagonCount,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMethod::ManualKg => "MANUAL_KG",
            InputMethod::BucketCount => "BUCKET_COUNT",
            InputMethod::WagonCount => "WAGON_COUNT",
        }
    }
}

impl FromStr for InputMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL_KG" => Ok(InputMethod::ManualKg),
            "BUCKET_COUNT" => Ok(InputMethod::BucketCount),
            "WAGON_COUNT" => Ok(InputMethod::WagonCount),
            other => Err(ValidationError::UnknownVariant {
                collection: COLLECTION,
                field: "input_method",
                value: other.to_string(),
            }),
        }
    }
}

/// Remote acknowledgment state of an event.
///
/// Transitions only `Pending -> Synced`; never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "PENDING",
            SyncState::Synced => "SYNCED",
        }
    }

    /// Combine two observations of the same event. Synced wins.
    pub fn merge(self, other: SyncState) -> SyncState {
        if self == SyncState::Synced || other == SyncState::Synced {
            SyncState::Synced
        } else {
            SyncState::Pending
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SyncState::Pending),
            "SYNCED" => Ok(SyncState::Synced),
            other => Err(ValidationError::UnknownVariant {
                collection: COLLECTION,
                field: "sync_state",
                value: other.to_string(),
            }),
        }
    }
}

/// One quantity change applied to a silo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Client-generated idempotency key.
    pub event_id: String,
    pub silo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub kind: EventKind,
    pub quantity_delta: Quantity,
    #[serde(default)]
    pub input_method: InputMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl LedgerEvent {
    /// Create a new local event, pending remote acknowledgment.
    pub fn new(
        silo_id: impl Into<String>,
        kind: EventKind,
        quantity_delta: Quantity,
        input_method: InputMethod,
        actor_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::new_v4().to_string(),
            silo_id: silo_id.into(),
            actor_id,
            kind,
            quantity_delta,
            input_method,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    /// Check keys, the delta bound and the sign rule for the event kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_key(COLLECTION, "event_id", &self.event_id, MAX_KEY_LEN)?;
        require_key(COLLECTION, "silo_id", &self.silo_id, MAX_KEY_LEN)?;
        if let Some(actor) = &self.actor_id {
            require_key(COLLECTION, "actor_id", actor, MAX_KEY_LEN)?;
        }

        if self.quantity_delta.abs() > Quantity::MAX_DELTA {
            let max = Quantity::MAX_DELTA.as_kg();
            return Err(ValidationError::OutOfRange {
                collection: COLLECTION,
                field: "quantity_delta",
                value: self.quantity_delta.as_kg(),
                min: -max,
                max,
            });
        }

        let expected = match self.kind {
            EventKind::Loading if !self.quantity_delta.is_positive() => Some("positive"),
            EventKind::Usage if !self.quantity_delta.is_negative() => Some("negative"),
            EventKind::Adjustment if self.quantity_delta.is_zero() => Some("non-zero"),
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(ValidationError::SignMismatch {
                kind: self.kind,
                expected,
                value: self.quantity_delta,
            });
        }

        Ok(())
    }
}
