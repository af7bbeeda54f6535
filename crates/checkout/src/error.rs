//! Checkout error types.

use common::{BookId, OrderId};
use domain::{DomainError, NotificationError};
use store::StoreError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur in checkout, reconciliation and order operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A requested book does not exist.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// A requested book has fewer units than asked for.
    #[error("Insufficient stock for book {title} ({book_id}): requested {requested}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        title: String,
        requested: u32,
        available: u32,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order exists but has no payment record.
    #[error("Payment not found for order: {0}")]
    PaymentNotFound(OrderId),

    /// The gateway notification could not be parsed.
    #[error("Invalid notification: {0}")]
    InvalidNotification(#[from] NotificationError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; the caller must fix it.
    Validation,
    /// A book, order or payment is absent.
    NotFound,
    /// Business rule rejection; retry with another quantity or book.
    InsufficientStock,
    /// Contradicts the current state.
    Conflict,
    /// Transient storage failure; safe to retry.
    Storage,
    /// The payment gateway failed; safe to retry.
    Gateway,
    /// Stored data could not be read back.
    Internal,
}

impl ErrorKind {
    /// Returns a stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
            ErrorKind::Gateway => "gateway",
            ErrorKind::Internal => "internal",
        }
    }
}

impl CheckoutError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Validation(_) | CheckoutError::InvalidNotification(_) => {
                ErrorKind::Validation
            }
            CheckoutError::BookNotFound(_)
            | CheckoutError::OrderNotFound(_)
            | CheckoutError::PaymentNotFound(_) => ErrorKind::NotFound,
            CheckoutError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CheckoutError::Domain(err) => match err {
                DomainError::InvalidTransition { .. } => ErrorKind::Conflict,
                DomainError::UnknownOrderStatus(_)
                | DomainError::UnknownPaymentStatus(_)
                | DomainError::EmptyOrder
                | DomainError::InvalidQuantity { .. }
                | DomainError::AmountOverflow => ErrorKind::Validation,
            },
            CheckoutError::Store(err) => match err {
                StoreError::BookNotFound(_)
                | StoreError::OrderNotFound(_)
                | StoreError::PaymentNotFound(_) => ErrorKind::NotFound,
                StoreError::Database(_) | StoreError::Unavailable(_) => ErrorKind::Storage,
                StoreError::Decode(_) | StoreError::Migration(_) => ErrorKind::Internal,
            },
            CheckoutError::Gateway(_) => ErrorKind::Gateway,
        }
    }

    /// Returns true if the same call may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage | ErrorKind::Gateway)
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderStatus;

    #[test]
    fn classifies_client_errors() {
        let err = CheckoutError::InsufficientStock {
            book_id: BookId::new(),
            title: "Bumi Manusia".into(),
            requested: 2,
            available: 1,
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Bumi Manusia"));

        let err = CheckoutError::from(NotificationError::MissingField("order_id"));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = CheckoutError::from(DomainError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped,
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = CheckoutError::from(DomainError::AmountOverflow);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn storage_errors_are_retryable() {
        let err = CheckoutError::from(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_retryable());

        let err = CheckoutError::from(StoreError::OrderNotFound(OrderId::new()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }
}
