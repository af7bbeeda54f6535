//! Order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// pending ──┬──► diproses ──► dikirim ──► selesai
///           ├──► challenge ──┬──► diproses
///           │                └──► batal
///           └──► batal
/// ```
///
/// The wire names are the ones the storefront has always used, so they are
/// kept verbatim in storage and JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Awaiting payment.
    #[default]
    #[serde(rename = "pending")]
    Pending,

    /// Payment was flagged by the gateway's fraud check and awaits review.
    #[serde(rename = "challenge")]
    Challenge,

    /// Paid; being prepared for shipping.
    #[serde(rename = "diproses")]
    Processing,

    /// Handed to the courier.
    #[serde(rename = "dikirim")]
    Shipped,

    /// Delivered (terminal).
    #[serde(rename = "selesai")]
    Completed,

    /// Cancelled, either by the gateway or by payment expiry (terminal).
    #[serde(rename = "batal")]
    Cancelled,
}

impl OrderStatus {
    /// Returns true once the order has left the payment phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Completed
                | OrderStatus::Cancelled
        )
    }

    /// Returns true if a fulfilment step may move the order to `next`.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Completed)
        )
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Challenge => "challenge",
            OrderStatus::Processing => "diproses",
            OrderStatus::Shipped => "dikirim",
            OrderStatus::Completed => "selesai",
            OrderStatus::Cancelled => "batal",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "challenge" => Ok(OrderStatus::Challenge),
            "diproses" => Ok(OrderStatus::Processing),
            "dikirim" => Ok(OrderStatus::Shipped),
            "selesai" => Ok(OrderStatus::Completed),
            "batal" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownOrderStatus(other.to_string())),
        }
    }
}
