//! Count-based entry conversion.
//!
//! Operators often count loader buckets or wagons instead of weighing. Each
//! count converts to kilograms through a configured factor.

use serde::Deserialize;

use super::event::InputMethod;
use super::quantity::Quantity;
use super::validation::ValidationError;

/// Default kilograms per loader bucket.
pub const DEFAULT_BUCKET_KG: f64 = 450.0;
/// Default kilograms per wagon.
pub const DEFAULT_WAGON_KG: f64 = 2_500.0;

/// Kilograms per counted unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversionFactors {
    pub bucket_kg: f64,
    pub wagon_kg: f64,
}

impl Default for ConversionFactors {
    fn default() -> Self {
        Self {
            bucket_kg: DEFAULT_BUCKET_KG,
            wagon_kg: DEFAULT_WAGON_KG,
        }
    }
}

/// An operator's raw entry, before conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry {
    Kilograms(f64),
    Buckets(f64),
    Wagons(f64),
}

impl Entry {
    pub fn input_method(&self) -> InputMethod {
        match self {
            Entry::Kilograms(_) => InputMethod::ManualKg,
            Entry::Buckets(_) => InputMethod::BucketCount,
            Entry::Wagons(_) => InputMethod::WagonCount,
        }
    }
}

impl ConversionFactors {
    /// Convert an entry into an unsigned quantity and its provenance tag.
    ///
    /// The entry magnitude must be a positive finite number; callers apply
    /// the sign for the action.
    pub fn to_quantity(&self, entry: Entry) -> Result<(Quantity, InputMethod), ValidationError> {
        let (amount, factor) = match entry {
            Entry::Kilograms(kg) => (kg, 1.0),
            Entry::Buckets(count) => (count, self.bucket_kg),
            Entry::Wagons(count) => (count, self.wagon_kg),
        };

        if !amount.is_finite() || amount <= 0.0 {
            return Err(ValidationError::OutOfRange {
                collection: "events",
                field: "amount",
                value: amount,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }

        let quantity = Quantity::from_kg(amount * factor).ok_or(ValidationError::OutOfRange {
            collection: "events",
            field: "amount",
            value: amount * factor,
            min: 0.0,
            max: Quantity::MAX_DELTA.as_kg(),
        })?;

        Ok((quantity, entry.input_method()))
    }
}
