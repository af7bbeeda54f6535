//! Payment gateway notification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::ReconcileOutcome;
use domain::GatewayPayload;
use serde::Serialize;
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct NotificationResponse {
    pub status: &'static str,
    pub outcome: ReconcileOutcome,
}

/// POST /payments/notification: applies a gateway webhook.
///
/// Duplicate and contradicting notifications are acknowledged with 200 so the
/// gateway stops resending them. Any error answers non-2xx so it retries.
#[tracing::instrument(skip(state, payload))]
pub async fn notification<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<GatewayPayload>, JsonRejection>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let Json(payload) = payload?;
    let outcome = state.processor.apply(payload).await?;

    Ok(Json(NotificationResponse {
        status: "ok",
        outcome,
    }))
}
