//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{CheckoutLine, CheckoutRequest, CustomerDetails, PaymentIntentRequest};
use common::{OrderId, UserId};
use domain::{Money, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub user_id: UserId,
    pub items: Vec<CheckoutLine>,
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_price: Money,
    pub currency: String,
    pub payment_expires_at: DateTime<Utc>,
    pub payment_token: String,
    pub redirect_url: String,
}

/// POST /checkout: reserves stock, creates the order and opens a payment page.
///
/// The order is committed before the gateway is called. A gateway failure is
/// reported as 502; the order stays pending and is reclaimed by the expiry
/// sweep if it is never paid.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let Json(body) = body?;

    let request = CheckoutRequest::new(body.user_id, body.items, body.shipping_address)
        .with_notes(body.notes);
    let receipt = state.coordinator.checkout(request).await?;

    let intent_request = PaymentIntentRequest::for_receipt(
        &receipt,
        body.customer.unwrap_or_default(),
        &state.order_ref_prefix,
        Utc::now(),
    );
    let intent = state
        .gateway
        .create_intent(&intent_request)
        .await
        .map_err(|e| {
            tracing::error!(order_id = %receipt.order.id, error = %e, "payment intent failed");
            ApiError::BadGateway(format!(
                "Order {} was created but the payment page could not be opened: {e}",
                receipt.order.id
            ))
        })?;

    let response = CheckoutResponse {
        order_id: receipt.order.id,
        status: receipt.order.status,
        total_price: receipt.order.total_price,
        currency: receipt.payment.currency,
        payment_expires_at: receipt.payment.expires_at,
        payment_token: intent.token,
        redirect_url: intent.redirect_url,
    };

    Ok((StatusCode::CREATED, Json(response)))
}
