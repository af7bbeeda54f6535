//! Order query and fulfilment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use checkout::OrderDetails;
use common::{BookId, OrderId, PaymentId, UserId};
use domain::{Money, Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::{OrderFilter, Store};

use super::parse_param;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest page a list request may ask for.
const MAX_LIMIT: usize = 100;

// -- Request types --

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_price: Money,
    pub shipping_address: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub book_id: BookId,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub status: PaymentStatus,
    pub total_price: Money,
    pub currency: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&OrderLine> for OrderItemResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            book_id: line.book_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status,
            total_price: payment.total_price,
            currency: payment.currency,
            payment_method: payment.payment_method,
            transaction_id: payment.transaction_id,
            expires_at: payment.expires_at,
            verified_at: payment.verified_at,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            items: order.lines.iter().map(OrderItemResponse::from).collect(),
            total_price: order.total_price,
            shipping_address: order.shipping_address,
            notes: order.notes,
            created_at: order.created_at,
            updated_at: order.updated_at,
            payment: None,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            payment: details.payment.map(PaymentResponse::from),
            ..Self::from(details.order)
        }
    }
}

// -- Handlers --

/// GET /orders: lists orders, newest first, optionally by status.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let Query(query) = query?;
    let filter = apply_query(OrderFilter::new(), query)?;
    list_with(&state, filter).await
}

/// GET /users/{user_id}/orders: lists one customer's orders, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list_for_user<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id: UserId = parse_param(&user_id, "user id")?;
    let Query(query) = query?;
    let filter = apply_query(OrderFilter::for_user(user_id), query)?;
    list_with(&state, filter).await
}

/// GET /orders/{id}: loads an order with its payment.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_param(&id, "order id")?;
    let details = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(details.into()))
}

/// PATCH /orders/{id}/status: moves a paid order to `dikirim` or `selesai`.
#[tracing::instrument(skip(state, body))]
pub async fn update_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_param(&id, "order id")?;
    let Json(body) = body?;
    let next: OrderStatus = parse_param(&body.status, "status")?;

    let order = state.orders.advance_status(order_id, next).await?;
    Ok(Json(order.into()))
}

fn apply_query(mut filter: OrderFilter, query: ListQuery) -> Result<OrderFilter, ApiError> {
    if let Some(status) = query.status {
        filter = filter.status(parse_param(&status, "status")?);
    }
    Ok(filter.limit(query.limit.unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT)))
}

async fn list_with<S: Store + 'static>(
    state: &AppState<S>,
    filter: OrderFilter,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders(filter).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}
