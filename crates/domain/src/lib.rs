//! Domain layer for the bookstore order core.
//!
//! This crate holds the plain data types every other crate passes around:
//! - `Book` and its stock counter
//! - `Order` with its snapshot `OrderLine`s and the `OrderStatus` lifecycle
//! - `Payment` with the `PaymentStatus` lifecycle and the raw gateway payload
//! - `GatewayNotification`, which parses an inbound webhook and maps the
//!   gateway's vocabulary onto local statuses
//!
//! Nothing here performs I/O.

pub mod book;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;

pub use book::Book;
pub use common::{BookId, OrderId, PaymentId, UserId};
pub use error::DomainError;
pub use money::{DEFAULT_CURRENCY, Money};
pub use order::{Order, OrderLine, OrderStatus};
pub use payment::{
    GatewayNotification, GatewayPayload, NotificationError, Payment, PaymentStatus, StatusTarget,
};
