//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised while building or transitioning domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A status string did not name any known order status.
    #[error("Unknown order status: {0}")]
    UnknownOrderStatus(String),

    /// A status string did not name any known payment status.
    #[error("Unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    /// An order was built without any lines.
    #[error("Order has no lines")]
    EmptyOrder,

    /// An order line asked for zero units.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A line extension or the order total does not fit in a money amount.
    #[error("Order total is too large")]
    AmountOverflow,

    /// The requested order status change is not part of the lifecycle.
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
