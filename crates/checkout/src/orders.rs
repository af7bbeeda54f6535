//! Read and fulfilment operations over committed orders.

use chrono::Utc;
use common::{OrderId, UserId};
use domain::{Order, OrderStatus, Payment};
use store::{OrderFilter, OrderStore, Store, StoreExt, Transaction};

use crate::error::{CheckoutError, Result};

/// An order together with its payment record.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub order: Order,
    pub payment: Option<Payment>,
}

/// Order queries for customers and staff, plus post-payment fulfilment.
///
/// Fulfilment only moves an order forward along `diproses -> dikirim -> selesai`;
/// payment-driven statuses stay with the reconciliation processor and the
/// expiry sweep.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order and its payment.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        let Some(order) = self.store.order(order_id).await? else {
            return Ok(None);
        };
        let payment = self.store.payment_for_order(order_id).await?;
        Ok(Some(OrderDetails { order, payment }))
    }

    /// Loads an order only if it belongs to `user_id`.
    pub async fn get_order_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<OrderDetails>> {
        Ok(self
            .get_order(order_id)
            .await?
            .filter(|details| details.order.user_id == user_id))
    }

    /// Lists orders matching `filter`, newest first.
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        Ok(self.store.orders(filter).await?)
    }

    /// Moves a paid order one fulfilment step forward.
    #[tracing::instrument(skip(self))]
    pub async fn advance_status(&self, order_id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let mut order = tx
            .find_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        let from = order.status;
        order.advance(next, Utc::now())?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, %from, to = %next, "order status advanced");
        Ok(order)
    }
}
