use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, OrderId, PaymentId, UserId};
use domain::{Book, Order, OrderStatus, Payment};

use crate::Result;

/// Result of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented; `remaining` is the new level.
    Reserved { remaining: u32 },
    /// Stock was left untouched because it is below the requested quantity.
    InsufficientStock { available: u32 },
}

/// A pending payment found past its deadline.
///
/// Also serves as the paging cursor of the expiry scan, which is ordered by
/// `(expires_at, payment_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub expires_at: DateTime<Utc>,
}

impl ExpiredPayment {
    /// Returns true if this row sorts after `cursor` in scan order.
    pub fn is_after(&self, cursor: &ExpiredPayment) -> bool {
        (self.expires_at, self.payment_id) > (cursor.expires_at, cursor.payment_id)
    }
}

/// Filter for listing orders, newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Only orders owned by this user.
    pub user_id: Option<UserId>,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderFilter {
    /// Creates a filter matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of orders returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `order` passes the user and status filters.
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.is_none_or(|user_id| order.user_id == user_id)
            && self.status.is_none_or(|status| order.status == status)
    }
}

/// Stock counters. The only writer of book stock.
#[async_trait]
pub trait InventoryGuard: Send {
    /// Loads a book.
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>>;

    /// Decrements stock by `quantity` only if at least `quantity` is available.
    ///
    /// Implemented as a single guarded update, so two transactions can never
    /// both take the last unit.
    async fn reserve(&mut self, id: BookId, quantity: u32) -> Result<ReserveOutcome>;

    /// Returns previously reserved units to stock.
    async fn release(&mut self, id: BookId, quantity: u32) -> Result<()>;
}

/// Orders together with their lines.
#[async_trait]
pub trait OrderStore: Send {
    /// Persists a new order and all of its lines.
    async fn create_order(&mut self, order: &Order) -> Result<()>;

    /// Loads an order, locking it for the rest of the transaction.
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Overwrites the mutable fields of an order.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Lists orders matching a filter, newest first.
    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>>;
}

/// Payment records, one per order.
#[async_trait]
pub trait PaymentStore: Send {
    /// Persists a new payment.
    async fn create_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Loads a payment, locking it for the rest of the transaction.
    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    /// Loads the payment of an order, locking it for the rest of the transaction.
    async fn find_payment_by_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Overwrites the mutable fields of a payment.
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Lists pending payments whose deadline is before `now`, ordered by
    /// `(expires_at, payment_id)` and starting strictly after `after`.
    async fn expired_pending_payments(
        &mut self,
        now: DateTime<Utc>,
        after: Option<ExpiredPayment>,
        limit: usize,
    ) -> Result<Vec<ExpiredPayment>>;
}

/// One open database transaction.
///
/// This is the façade every multi-step operation works through: it is created
/// once per request by [`Store::begin`] and exposes all three stores bound to
/// the same transaction. Dropping it without calling `commit` rolls back.
#[async_trait]
pub trait Transaction: InventoryGuard + OrderStore + PaymentStore + Send + Sized {
    /// Makes every change visible to other transactions.
    async fn commit(self) -> Result<()>;

    /// Discards every change.
    async fn rollback(self) -> Result<()>;
}

/// Entry point of a storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type of this backend.
    type Tx: Transaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Single reads, each in its own implicit transaction.
#[async_trait]
pub trait StoreExt: Store {
    /// Loads a book.
    async fn book(&self, id: BookId) -> Result<Option<Book>> {
        let mut tx = self.begin().await?;
        let book = tx.find_book(id).await?;
        tx.commit().await?;
        Ok(book)
    }

    /// Loads an order.
    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut tx = self.begin().await?;
        let order = tx.find_order(id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Loads a payment.
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let mut tx = self.begin().await?;
        let payment = tx.find_payment(id).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Loads the payment of an order.
    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let mut tx = self.begin().await?;
        let payment = tx.find_payment_by_order(order_id).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Lists orders matching a filter.
    async fn orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let mut tx = self.begin().await?;
        let orders = tx.list_orders(&filter).await?;
        tx.commit().await?;
        Ok(orders)
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
