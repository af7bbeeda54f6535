use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::order::Order;
use crate::{Money, OrderId, PaymentId};

use super::{GatewayNotification, PaymentStatus};

/// Raw gateway payload kept for audit.
///
/// The gateway owns this document's shape and changes it over time, so it is
/// stored as an untyped JSON object.
pub type GatewayPayload = serde_json::Map<String, serde_json::Value>;

/// The payment record belonging to exactly one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    /// Copied from the order when the payment is created.
    pub total_price: Money,
    pub currency: String,
    /// Gateway transaction id, filled by the first notification.
    pub transaction_id: Option<String>,
    /// Gateway payment method label, filled by the first notification.
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    /// Last payload received from the gateway.
    pub gateway_response: Option<GatewayPayload>,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates the pending payment for a freshly built order.
    pub fn pending_for(
        order: &Order,
        currency: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id: order.id,
            total_price: order.total_price,
            currency: currency.into(),
            transaction_id: None,
            payment_method: None,
            status: PaymentStatus::Pending,
            gateway_response: None,
            verified_at: None,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the payment is still pending past its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expires_at < now
    }

    /// Copies the audit fields of a notification onto the record.
    ///
    /// Runs whether or not the notification's status is accepted.
    pub fn record_notification(&mut self, notification: &GatewayNotification, now: DateTime<Utc>) {
        if let Some(method) = &notification.payment_type {
            self.payment_method = Some(method.clone());
        }
        if let Some(transaction_id) = &notification.transaction_id {
            self.transaction_id = Some(transaction_id.clone());
        }
        self.gateway_response = Some(notification.raw.clone());
        self.updated_at = now;
    }

    /// Sets a new status; reaching `success` stamps the verification time.
    pub fn set_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == PaymentStatus::Success {
            self.verified_at = Some(now);
        }
        self.updated_at = now;
    }
}
