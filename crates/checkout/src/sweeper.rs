//! Expiry sweep: cancels unpaid orders past their deadline and returns their stock.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::BookId;
use domain::{OrderStatus, PaymentStatus};
use store::{ExpiredPayment, InventoryGuard, OrderStore, PaymentStore, Store, Transaction};
use tokio::time::MissedTickBehavior;

use crate::error::{CheckoutError, Result};

/// Default time between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of expired payments read per page of a sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired pending payments found.
    pub scanned: usize,
    /// Payments failed and orders cancelled.
    pub cancelled: usize,
    /// Payments that were no longer pending on re-check.
    pub skipped: usize,
    /// Payments whose cancellation failed and was rolled back.
    pub failed: usize,
}

/// Periodically cancels expired pending payments.
///
/// Each payment is cancelled in its own transaction: the order row and then the
/// payment row are locked and the payment is re-checked, so a notification that
/// committed first wins and the payment is skipped. A failing payment is logged
/// and does not stop the rest of the sweep.
///
/// Candidates are read in pages of `batch_size`, each page starting after the
/// last row of the previous one, so payments that keep failing never hide the
/// ones behind them.
pub struct ExpirySweeper<S: Store> {
    store: S,
    batch_size: usize,
    interval: Duration,
}

impl<S: Store> ExpirySweeper<S> {
    /// Creates a sweeper with the default interval and batch size.
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sets the number of expired payments read per page.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the time between sweeps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweeps payments expired as of now.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweeps payments whose deadline is before `now`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor = None;

        loop {
            let page = {
                let mut tx = self.store.begin().await?;
                let page = tx
                    .expired_pending_payments(now, cursor, self.batch_size)
                    .await?;
                tx.commit().await?;
                page
            };
            let Some(last) = page.last().copied() else {
                break;
            };
            report.scanned += page.len();

            for candidate in &page {
                self.cancel_one(*candidate, now, &mut report).await;
            }

            if page.len() < self.batch_size {
                break;
            }
            cursor = Some(last);
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                cancelled = report.cancelled,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn cancel_one(
        &self,
        candidate: ExpiredPayment,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        match self.cancel(candidate, now).await {
            Ok(true) => {
                report.cancelled += 1;
                metrics::counter!("expiry_sweep_cancelled_total").increment(1);
            }
            Ok(false) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                metrics::counter!("expiry_sweep_failed_total").increment(1);
                tracing::error!(
                    payment_id = %candidate.payment_id,
                    order_id = %candidate.order_id,
                    error = %e,
                    "failed to cancel expired payment"
                );
            }
        }
    }

    /// Cancels one payment and its order, returning false if it is no longer expired.
    async fn cancel(&self, candidate: ExpiredPayment, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.store.begin().await?;

        let mut order = tx
            .find_order(candidate.order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(candidate.order_id))?;
        let mut payment = tx
            .find_payment(candidate.payment_id)
            .await?
            .ok_or(CheckoutError::PaymentNotFound(candidate.order_id))?;

        if !payment.is_expired_at(now) {
            tracing::debug!(
                payment_id = %payment.id,
                status = %payment.status,
                "payment settled before sweep, skipping"
            );
            tx.rollback().await?;
            return Ok(false);
        }

        payment.set_status(PaymentStatus::Failed, now);
        order.set_status(OrderStatus::Cancelled, now);

        let mut released: BTreeMap<BookId, u32> = BTreeMap::new();
        for line in &order.lines {
            *released.entry(line.book_id).or_default() += line.quantity;
        }
        for (book_id, quantity) in released {
            tx.release(book_id, quantity).await?;
        }

        tx.update_order(&order).await?;
        tx.update_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, payment_id = %payment.id, "expired order cancelled");
        Ok(true)
    }

    /// Sweeps every `interval` until `shutdown` resolves.
    ///
    /// The first sweep runs immediately. Sweep errors are logged and the loop
    /// keeps going.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "expiry sweep failed");
                    }
                }
            }
        }
    }
}
