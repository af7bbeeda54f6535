use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, OrderId, PaymentId};
use domain::{Book, Order, Payment, PaymentStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{
        ExpiredPayment, InventoryGuard, OrderFilter, OrderStore, PaymentStore, ReserveOutcome,
        Store, Transaction,
    },
};

#[derive(Debug, Clone, Default)]
struct InMemoryState {
    books: HashMap<BookId, Book>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_create_order: AtomicBool,
    failing_order_updates: RwLock<HashSet<OrderId>>,
}

/// In-memory store for tests and local runs.
///
/// A transaction holds the one state lock from `begin` until it is committed
/// or dropped, so transactions are fully serialised. Changes go to a private
/// working copy that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a book.
    ///
    /// Catalog management is outside the order core; this is how tests and
    /// local runs stock the shelves.
    pub async fn insert_book(&self, book: Book) {
        self.state.lock().await.books.insert(book.id, book);
    }

    /// Returns the current stock of a book.
    pub async fn stock_of(&self, id: BookId) -> Option<u32> {
        self.state.lock().await.books.get(&id).map(|book| book.stock)
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    /// Makes every `create_order` fail while set.
    pub fn set_fail_on_create_order(&self, fail: bool) {
        self.faults.fail_on_create_order.store(fail, Ordering::SeqCst);
    }

    /// Makes every `update_order` for this order fail.
    pub fn fail_order_updates_for(&self, order_id: OrderId) {
        self.faults
            .failing_order_updates
            .write()
            .unwrap()
            .insert(order_id);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<InMemoryState>,
    working: InMemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(mut self) -> Result<()> {
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl InventoryGuard for InMemoryTransaction {
    async fn find_book(&mut self, id: BookId) -> Result<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn reserve(&mut self, id: BookId, quantity: u32) -> Result<ReserveOutcome> {
        let book = self
            .working
            .books
            .get_mut(&id)
            .ok_or(StoreError::BookNotFound(id))?;

        if book.stock < quantity {
            return Ok(ReserveOutcome::InsufficientStock {
                available: book.stock,
            });
        }

        book.stock -= quantity;
        Ok(ReserveOutcome::Reserved {
            remaining: book.stock,
        })
    }

    async fn release(&mut self, id: BookId, quantity: u32) -> Result<()> {
        let book = self
            .working
            .books
            .get_mut(&id)
            .ok_or(StoreError::BookNotFound(id))?;
        book.stock += quantity;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryTransaction {
    async fn create_order(&mut self, order: &Order) -> Result<()> {
        if self.faults.fail_on_create_order.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("create_order failed".to_string()));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        if self
            .faults
            .failing_order_updates
            .read()
            .unwrap()
            .contains(&order.id)
        {
            return Err(StoreError::Unavailable(format!(
                "update_order failed for {}",
                order.id
            )));
        }

        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        stored.status = order.status;
        stored.shipping_address = order.shipping_address.clone();
        stored.notes = order.notes.clone();
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .working
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }
}

#[async_trait]
impl PaymentStore for InMemoryTransaction {
    async fn create_payment(&mut self, payment: &Payment) -> Result<()> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn find_payment_by_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|payment| payment.order_id == order_id)
            .cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let stored = self
            .working
            .payments
            .get_mut(&payment.id)
            .ok_or(StoreError::PaymentNotFound(payment.id))?;
        // id, order_id, total_price, currency and created_at are immutable
        stored.transaction_id = payment.transaction_id.clone();
        stored.payment_method = payment.payment_method.clone();
        stored.status = payment.status;
        stored.gateway_response = payment.gateway_response.clone();
        stored.verified_at = payment.verified_at;
        stored.expires_at = payment.expires_at;
        stored.updated_at = payment.updated_at;
        Ok(())
    }

    async fn expired_pending_payments(
        &mut self,
        now: DateTime<Utc>,
        after: Option<ExpiredPayment>,
        limit: usize,
    ) -> Result<Vec<ExpiredPayment>> {
        let mut expired: Vec<_> = self
            .working
            .payments
            .values()
            .filter(|payment| payment.status == PaymentStatus::Pending && payment.expires_at < now)
            .map(|payment| ExpiredPayment {
                payment_id: payment.id,
                order_id: payment.order_id,
                expires_at: payment.expires_at,
            })
            .filter(|candidate| after.is_none_or(|cursor| candidate.is_after(&cursor)))
            .collect();
        expired.sort_by_key(|candidate| (candidate.expires_at, candidate.payment_id));
        expired.truncate(limit);

        Ok(expired)
    }
}
