//! Monetary amounts.

use serde::{Deserialize, Serialize};

/// Currency used when nothing else is configured.
pub const DEFAULT_CURRENCY: &str = "IDR";

/// Money amount in the smallest unit of its currency.
///
/// Rupiah has no minor unit in practice, so `Money::new(45000)` is IDR 45,000.
/// Integer arithmetic keeps order totals exact; it is checked, so an overflow
/// surfaces as `None` instead of a wrapped or panicking total.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from its smallest-unit value.
    pub fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in the smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.0
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
