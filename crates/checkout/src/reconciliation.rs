//! Applies inbound gateway notifications to local payment and order state.

use chrono::Utc;
use domain::payment::StatusChange;
use domain::{GatewayNotification, GatewayPayload, PaymentStatus};
use serde::Serialize;
use store::{OrderStore, PaymentStore, Store, Transaction};

use crate::error::{CheckoutError, Result};

/// What a notification did to the payment it addressed.
///
/// Every outcome except an error means the raw payload, payment method and
/// transaction id were written onto the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Payment and order moved to a new status.
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// The payment is still pending.
    Unchanged,
    /// The notification repeats an already recorded status.
    Duplicate,
    /// The notification contradicts the recorded status and was ignored.
    Rejected {
        current: PaymentStatus,
        requested: PaymentStatus,
    },
    /// The gateway status has no local meaning.
    Unrecognized,
}

impl ReconcileOutcome {
    /// Returns a stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Rejected { .. } => "rejected",
            ReconcileOutcome::Unrecognized => "unrecognized",
        }
    }
}

/// Reconciles gateway notifications, one transaction per notification.
///
/// The order row is locked before the payment row, matching the expiry sweep,
/// so a notification and a sweep racing on the same order serialize and the
/// later one re-reads the winner's result.
pub struct ReconciliationProcessor<S: Store> {
    store: S,
}

impl<S: Store> ReconciliationProcessor<S> {
    /// Creates a new processor.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Applies one raw notification payload.
    #[tracing::instrument(skip(self, payload))]
    pub async fn apply(&self, payload: GatewayPayload) -> Result<ReconcileOutcome> {
        let result = self.try_apply(payload).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::counter!("payment_notifications_total", "outcome" => label).increment(1);

        if let Err(e) = &result {
            tracing::warn!(error = %e, "notification not applied");
        }
        result
    }

    async fn try_apply(&self, payload: GatewayPayload) -> Result<ReconcileOutcome> {
        let notification = GatewayNotification::from_payload(payload)?;
        let order_id = notification.order_id()?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let mut order = tx
            .find_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        let mut payment = tx
            .find_payment_by_order(order_id)
            .await?
            .ok_or(CheckoutError::PaymentNotFound(order_id))?;

        payment.record_notification(&notification, now);

        let outcome = match notification.target() {
            None => {
                tracing::warn!(
                    %order_id,
                    transaction_status = %notification.transaction_status,
                    fraud_status = ?notification.fraud_status,
                    "unrecognized gateway status"
                );
                ReconcileOutcome::Unrecognized
            }
            Some(target) => match payment.status.change_to(target.payment) {
                StatusChange::Apply => {
                    let from = payment.status;
                    payment.set_status(target.payment, now);
                    order.set_status(target.order, now);
                    tx.update_order(&order).await?;
                    tracing::info!(
                        %order_id,
                        %from,
                        to = %target.payment,
                        "payment status applied"
                    );
                    ReconcileOutcome::Applied {
                        from,
                        to: target.payment,
                    }
                }
                StatusChange::Unchanged => ReconcileOutcome::Unchanged,
                StatusChange::Duplicate => {
                    tracing::debug!(%order_id, status = %payment.status, "duplicate notification");
                    ReconcileOutcome::Duplicate
                }
                StatusChange::Contradiction => {
                    tracing::warn!(
                        %order_id,
                        current = %payment.status,
                        requested = %target.payment,
                        "conflicting notification ignored"
                    );
                    ReconcileOutcome::Rejected {
                        current: payment.status,
                        requested: target.payment,
                    }
                }
            },
        };

        tx.update_payment(&payment).await?;
        tx.commit().await?;

        Ok(outcome)
    }
}
