//! Checkout coordinator: turns a cart into a committed order and payment.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{Duration, Utc};
use common::{BookId, UserId};
use domain::{Book, DEFAULT_CURRENCY, Order, OrderLine, Payment};
use serde::{Deserialize, Serialize};
use store::{InventoryGuard, OrderStore, PaymentStore, ReserveOutcome, Store, Transaction};

use crate::error::{CheckoutError, Result};

/// How long a customer has to pay before the sweep reclaims the stock.
pub const DEFAULT_PAYMENT_TTL_HOURS: i64 = 24;

/// Most units of one book a single checkout may ask for.
pub const MAX_QUANTITY_PER_BOOK: u32 = 10_000;

/// One requested cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub book_id: BookId,
    pub quantity: u32,
}

impl CheckoutLine {
    /// Creates a new cart line.
    pub fn new(book_id: BookId, quantity: u32) -> Self {
        Self { book_id, quantity }
    }
}

/// An authenticated checkout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<CheckoutLine>,
    pub shipping_address: String,
    pub notes: String,
}

impl CheckoutRequest {
    /// Creates a request with empty notes.
    pub fn new(
        user_id: UserId,
        items: Vec<CheckoutLine>,
        shipping_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            items,
            shipping_address: shipping_address.into(),
            notes: String::new(),
        }
    }

    /// Sets the free-text notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Checks the request shape before any storage is touched.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CheckoutError::Validation(
                "checkout needs at least one item".to_string(),
            ));
        }
        if let Some(line) = self.items.iter().find(|line| line.quantity == 0) {
            return Err(CheckoutError::Validation(format!(
                "quantity for book {} must be greater than zero",
                line.book_id
            )));
        }
        if let Some(line) = self.items.iter().find(|line| line.quantity > MAX_QUANTITY_PER_BOOK) {
            return Err(too_many(line.book_id));
        }
        if self.shipping_address.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "shipping address is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Total quantity per book, in ascending book id order.
    fn quantities(&self) -> Result<BTreeMap<BookId, u32>> {
        let mut wanted: BTreeMap<BookId, u32> = BTreeMap::new();
        for line in &self.items {
            let total = wanted.entry(line.book_id).or_default();
            *total = total
                .checked_add(line.quantity)
                .filter(|total| *total <= MAX_QUANTITY_PER_BOOK)
                .ok_or_else(|| too_many(line.book_id))?;
        }
        Ok(wanted)
    }
}

fn too_many(book_id: BookId) -> CheckoutError {
    CheckoutError::Validation(format!(
        "quantity for book {book_id} exceeds {MAX_QUANTITY_PER_BOOK}"
    ))
}

/// The committed result of a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub payment: Payment,
    /// Titles of the ordered books at checkout time.
    pub titles: BTreeMap<BookId, String>,
}

/// Tunables for new orders and payments.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Time from checkout until an unpaid payment expires.
    pub payment_ttl: Duration,
    /// Currency recorded on every payment.
    pub currency: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            payment_ttl: Duration::hours(DEFAULT_PAYMENT_TTL_HOURS),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Orchestrates a checkout inside a single store transaction.
///
/// Book rows are reserved in ascending id order so that concurrent checkouts
/// over overlapping carts always lock in the same order. Any failure drops the
/// transaction, which rolls back every reservation together with the order and
/// payment rows.
pub struct CheckoutCoordinator<S: Store> {
    store: S,
    settings: CheckoutSettings,
}

impl<S: Store> CheckoutCoordinator<S> {
    /// Creates a coordinator with default settings.
    pub fn new(store: S) -> Self {
        Self::with_settings(store, CheckoutSettings::default())
    }

    /// Creates a coordinator with explicit settings.
    pub fn with_settings(store: S, settings: CheckoutSettings) -> Self {
        Self { store, settings }
    }

    /// Returns the settings in use.
    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Reserves stock and creates a pending order and payment.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, lines = request.items.len())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let result = self.try_checkout(request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                tracing::info!(
                    order_id = %receipt.order.id,
                    total_price = %receipt.order.total_price,
                    "checkout committed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }

        result
    }

    async fn try_checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        request.validate()?;
        let wanted = request.quantities()?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let mut books: HashMap<BookId, Book> = HashMap::with_capacity(wanted.len());
        for (&book_id, &quantity) in &wanted {
            let book = tx
                .find_book(book_id)
                .await?
                .ok_or(CheckoutError::BookNotFound(book_id))?;

            match tx.reserve(book_id, quantity).await? {
                ReserveOutcome::Reserved { remaining } => {
                    tracing::debug!(%book_id, quantity, remaining, "stock reserved");
                }
                ReserveOutcome::InsufficientStock { available } => {
                    return Err(CheckoutError::InsufficientStock {
                        book_id,
                        title: book.title,
                        requested: quantity,
                        available,
                    });
                }
            }
            books.insert(book_id, book);
        }

        let lines = request
            .items
            .iter()
            .map(|line| OrderLine::new(line.book_id, line.quantity, books[&line.book_id].price))
            .collect();
        let order = Order::new(
            request.user_id,
            lines,
            request.shipping_address,
            request.notes,
            now,
        )?;
        tx.create_order(&order).await?;

        let payment = Payment::pending_for(
            &order,
            self.settings.currency.clone(),
            self.settings.payment_ttl,
            now,
        );
        tx.create_payment(&payment).await?;

        tx.commit().await?;

        let titles = books
            .into_iter()
            .map(|(book_id, book)| (book_id, book.title))
            .collect();
        Ok(CheckoutReceipt {
            order,
            payment,
            titles,
        })
    }
}
