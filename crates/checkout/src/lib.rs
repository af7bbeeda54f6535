//! Checkout, payment reconciliation and expiry sweep for the bookstore order core.
//!
//! Three processes share the stock counters and order rows kept by the `store`
//! crate:
//! 1. [`CheckoutCoordinator`] reserves stock and creates a pending order and payment
//! 2. [`ReconciliationProcessor`] applies gateway notifications to payment and order
//! 3. [`ExpirySweeper`] cancels unpaid orders past their deadline and returns stock
//!
//! Each runs one store transaction per unit of work. The payment gateway is
//! reached through [`PaymentGateway`] after checkout commits and never writes
//! local state.

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod reconciliation;
pub mod sweeper;

pub use coordinator::{
    CheckoutCoordinator, CheckoutLine, CheckoutReceipt, CheckoutRequest, CheckoutSettings,
};
pub use error::{CheckoutError, ErrorKind, Result};
pub use gateway::{
    CustomerDetails, GatewayError, InMemoryPaymentGateway, ItemDetail, PaymentGateway,
    PaymentIntent, PaymentIntentRequest, SnapGateway,
};
pub use orders::{OrderDetails, OrderService};
pub use reconciliation::{ReconcileOutcome, ReconciliationProcessor};
pub use sweeper::{ExpirySweeper, SweepReport};
