//! Exact money arithmetic.
//!
//! Money is always an integer number of minor units ([`Cents`]). Products of
//! money with quantities and ratios are computed as [`Decimal`] and brought
//! back to minor units by truncating toward zero. Binary floating point is
//! never involved.
//!
//! Truncation (not rounding) is the billing policy: a fractional cent is never
//! charged.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billing_core::{DomainError, DomainResult, ValueObject};

/// An amount in minor currency units (e.g. euro cents).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(i64);

impl ValueObject for Cents {}

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }

    pub fn checked_add(self, other: Cents) -> Option<Cents> {
        self.0.checked_add(other.0).map(Cents)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for Cents {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exact product of two decimals.
pub fn multiply(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| DomainError::invariant(format!("decimal overflow multiplying {a} by {b}")))
}

/// `amount × factor`, kept exact.
pub fn scale(amount: Cents, factor: Decimal) -> DomainResult<Decimal> {
    multiply(amount.to_decimal(), factor)
}

/// Convert a decimal amount of minor units to [`Cents`], discarding the fraction.
///
/// `12.99 → 12`, `-12.99 → -12`.
pub fn truncate(value: Decimal) -> DomainResult<Cents> {
    value
        .trunc()
        .to_i64()
        .map(Cents)
        .ok_or_else(|| DomainError::invariant(format!("amount out of range: {value}")))
}

/// `truncate(unit_price × quantity × ratio)`.
pub fn prorated_subtotal(unit_price: Cents, quantity: i64, ratio: Decimal) -> DomainResult<Cents> {
    let gross = scale(unit_price, Decimal::from(quantity))?;
    truncate(multiply(gross, ratio)?)
}
