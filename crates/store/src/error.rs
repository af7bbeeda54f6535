use common::{BookId, OrderId, PaymentId};
use thiserror::Error;

/// Errors that can occur when talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row that an update targeted does not exist.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// An order that an update targeted does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A payment that an update targeted does not exist.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A row holds a value the domain model cannot represent.
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// The backend refused the operation (used by fault injection in tests).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
