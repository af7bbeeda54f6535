//! Payment-intent gateway boundary.
//!
//! The gateway is called after a checkout has committed. It only reads the
//! receipt it is handed and never touches the store; if it fails, the order
//! stays `pending` until a notification arrives or the expiry sweep reclaims it.

pub mod memory;
pub mod snap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Money;
use domain::payment::order_reference;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::CheckoutReceipt;

pub use memory::InMemoryPaymentGateway;
pub use snap::SnapGateway;

/// Errors returned by a payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status.
    #[error("Gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The gateway answered with a body we could not read.
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Contact details forwarded to the gateway's payment page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One line of the payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    /// Local book id.
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

/// Everything the gateway needs to open a payment page for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// External order reference; segment 1 is the local order id.
    pub order_ref: String,
    pub gross_amount: Money,
    pub currency: String,
    pub items: Vec<ItemDetail>,
    pub customer: CustomerDetails,
    pub expires_at: DateTime<Utc>,
}

impl PaymentIntentRequest {
    /// Builds the request for a committed checkout.
    pub fn for_receipt(
        receipt: &CheckoutReceipt,
        customer: CustomerDetails,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let items = receipt
            .order
            .lines
            .iter()
            .map(|line| ItemDetail {
                id: line.book_id.to_string(),
                name: receipt
                    .titles
                    .get(&line.book_id)
                    .cloned()
                    .unwrap_or_else(|| line.book_id.to_string()),
                price: line.unit_price.amount(),
                quantity: line.quantity,
            })
            .collect();

        Self {
            order_ref: order_reference(prefix, receipt.order.id, now),
            gross_amount: receipt.payment.total_price,
            currency: receipt.payment.currency.clone(),
            items,
            customer,
            expires_at: receipt.payment.expires_at,
        }
    }
}

/// A payment page opened by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub token: String,
    pub redirect_url: String,
}

/// Trait for opening payment pages at an external gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for the given request.
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError>;
}
