//! Field-level validation for ledger records.

use super::event::EventKind;
use super::quantity::Quantity;

/// Maximum length of a primary or foreign key.
pub const MAX_KEY_LEN: usize = 36;

/// Maximum length of an analysis identifier.
pub const MAX_ANALYSIS_KEY_LEN: usize = 100;

/// Schema violation for a single record.
///
/// Validation failures are local and final: the record is not committed and
/// nothing retries it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{collection}: missing required field '{field}'")]
    MissingField {
        collection: &'static str,
        field: &'static str,
    },

    #[error("{collection}: field '{field}' is {len} chars, max {max}")]
    TooLong {
        collection: &'static str,
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{collection}: field '{field}' out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        collection: &'static str,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{collection}: unknown value '{value}' for field '{field}'")]
    UnknownVariant {
        collection: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{kind} event requires a {expected} quantity, got {value}")]
    SignMismatch {
        kind: EventKind,
        expected: &'static str,
        value: Quantity,
    },

    #[error("unknown silo '{0}'")]
    UnknownSilo(String),
}

pub(crate) fn require_key(
    collection: &'static str,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { collection, field });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            collection,
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

pub(crate) fn require_text(
    collection: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { collection, field });
    }
    Ok(())
}

pub(crate) fn require_range(
    collection: &'static str,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::OutOfRange {
            collection,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
