use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{BookId, Money, OrderId, UserId};

use super::OrderStatus;

/// One line of an order.
///
/// `unit_price` is a snapshot of the book price at checkout; later catalog
/// price changes never reach an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub book_id: BookId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(book_id: BookId, quantity: u32, unit_price: Money) -> Self {
        Self {
            book_id,
            quantity,
            unit_price,
        }
    }

    /// Returns `unit_price * quantity`, or `None` on overflow.
    pub fn extension(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// A committed order.
///
/// `total_price` is fixed when the order is built and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from its lines, fixing the total price.
    pub fn new(
        user_id: UserId,
        lines: Vec<OrderLine>,
        shipping_address: impl Into<String>,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::InvalidQuantity {
                quantity: line.quantity,
            });
        }

        let total_price = lines
            .iter()
            .try_fold(Money::zero(), |total, line| {
                line.extension().and_then(|extension| total.checked_add(extension))
            })
            .ok_or(DomainError::AmountOverflow)?;

        Ok(Self {
            id: OrderId::new(),
            user_id,
            lines,
            total_price,
            status: OrderStatus::Pending,
            shipping_address: shipping_address.into(),
            notes: notes.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets a new status and bumps `updated_at`.
    pub fn set_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Moves a paid order along the fulfilment path.
    pub fn advance(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_advance_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.set_status(next, now);
        Ok(())
    }
}
