//! Inbound payment-gateway notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::OrderId;
use crate::order::OrderStatus;

use super::{GatewayPayload, PaymentStatus};

/// Errors raised while reading a notification payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    /// A required string field is absent.
    #[error("Notification is missing field '{0}'")]
    MissingField(&'static str),

    /// The external order reference does not embed a local order id.
    #[error("Malformed order reference: {0}")]
    MalformedReference(String),
}

/// Local statuses a gateway notification asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTarget {
    pub payment: PaymentStatus,
    pub order: OrderStatus,
}

impl StatusTarget {
    const SUCCESS: Self = Self {
        payment: PaymentStatus::Success,
        order: OrderStatus::Processing,
    };
    const CHALLENGE: Self = Self {
        payment: PaymentStatus::Challenge,
        order: OrderStatus::Challenge,
    };
    const FAILED: Self = Self {
        payment: PaymentStatus::Failed,
        order: OrderStatus::Cancelled,
    };
    const PENDING: Self = Self {
        payment: PaymentStatus::Pending,
        order: OrderStatus::Pending,
    };
}

/// Maps the gateway's transaction and fraud status onto local statuses.
///
/// Returns `None` for combinations outside the table; those notifications are
/// kept for audit but move nothing.
pub fn map_gateway_status(
    transaction_status: &str,
    fraud_status: Option<&str>,
) -> Option<StatusTarget> {
    match (transaction_status, fraud_status) {
        ("capture", Some("accept")) => Some(StatusTarget::SUCCESS),
        ("capture", Some("challenge")) => Some(StatusTarget::CHALLENGE),
        ("capture", Some("deny")) => Some(StatusTarget::FAILED),
        ("capture", _) => None,
        ("settlement", _) => Some(StatusTarget::SUCCESS),
        ("deny" | "cancel" | "expire", _) => Some(StatusTarget::FAILED),
        ("pending", _) => Some(StatusTarget::PENDING),
        _ => None,
    }
}

/// Returns true if `prefix` can lead an order reference: non-empty and free of `-`.
pub fn is_valid_reference_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && !prefix.contains('-')
}

/// Builds the external order reference sent to the gateway.
///
/// Segment 1 carries the order id in simple (unhyphenated) form so that the
/// `-`-split on the way back in yields the whole id. The timestamp suffix keeps
/// references unique when a customer retries payment for the same order.
/// Any `-` in `prefix` is written as `_` so the id stays in segment 1.
pub fn order_reference(prefix: &str, order_id: OrderId, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix.replace('-', "_"),
        order_id.as_uuid().simple(),
        now.timestamp()
    )
}

/// A parsed gateway notification.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayNotification {
    pub order_ref: String,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_id: Option<String>,
    /// The full payload as received.
    pub raw: GatewayPayload,
}

impl GatewayNotification {
    /// Reads the fields the order core needs out of a raw payload.
    pub fn from_payload(raw: GatewayPayload) -> Result<Self, NotificationError> {
        let order_ref =
            string_field(&raw, "order_id").ok_or(NotificationError::MissingField("order_id"))?;
        let transaction_status = string_field(&raw, "transaction_status")
            .ok_or(NotificationError::MissingField("transaction_status"))?;

        Ok(Self {
            order_ref,
            transaction_status,
            fraud_status: string_field(&raw, "fraud_status"),
            payment_type: string_field(&raw, "payment_type"),
            transaction_id: string_field(&raw, "transaction_id"),
            raw,
        })
    }

    /// Extracts the local order id from segment 1 of the external reference.
    pub fn order_id(&self) -> Result<OrderId, NotificationError> {
        self.order_ref
            .split('-')
            .nth(1)
            .and_then(|segment| segment.parse().ok())
            .ok_or_else(|| NotificationError::MalformedReference(self.order_ref.clone()))
    }

    /// Local statuses this notification asks for, if it maps to any.
    pub fn target(&self) -> Option<StatusTarget> {
        map_gateway_status(&self.transaction_status, self.fraud_status.as_deref())
    }
}

fn string_field(raw: &GatewayPayload, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
