//! Exact quantity arithmetic.
//!
//! Quantities are integer grams so that folding thousands of deltas is exact
//! and order-independent. Outside the crate (wire payloads, configuration)
//! they are expressed as kilograms.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const GRAMS_PER_KG: i64 = 1_000;

/// A signed mass, stored as whole grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    /// Largest magnitude accepted for a single ledger delta (100 t).
    pub const MAX_DELTA: Quantity = Quantity(100_000 * GRAMS_PER_KG);

    pub const fn from_grams(grams: i64) -> Self {
        Self(grams)
    }

    pub const fn from_whole_kg(kg: i64) -> Self {
        Self(kg * GRAMS_PER_KG)
    }

    /// Convert kilograms to a quantity, rounding to the nearest gram.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` gram range.
    pub fn from_kg(kg: f64) -> Option<Self> {
        let grams = (kg * GRAMS_PER_KG as f64).round();
        if !grams.is_finite() || grams.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(grams as i64))
    }

    pub const fn grams(self) -> i64 {
        self.0
    }

    pub fn as_kg(self) -> f64 {
        self.0 as f64 / GRAMS_PER_KG as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kg", self.as_kg())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % GRAMS_PER_KG == 0 {
            serializer.serialize_i64(self.0 / GRAMS_PER_KG)
        } else {
            serializer.serialize_f64(self.as_kg())
        }
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kg = f64::deserialize(deserializer)?;
        Quantity::from_kg(kg)
            .ok_or_else(|| serde::de::Error::custom(format!("quantity out of range: {kg}")))
    }
}
