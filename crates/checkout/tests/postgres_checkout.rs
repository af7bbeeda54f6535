//! Checkout, reconciliation and expiry sweep against PostgreSQL.
//!
//! These tests drive the row locks and conditional updates of the PostgreSQL
//! store under real concurrency. They share one container and truncate its
//! tables per test. Run with:
//!
//! ```bash
//! cargo test -p checkout --test postgres_checkout
//! ```

use std::sync::Arc;

use checkout::{
    CheckoutCoordinator, CheckoutError, CheckoutLine, CheckoutRequest, ExpirySweeper,
    ReconcileOutcome, ReconciliationProcessor,
};
use chrono::{Duration, Utc};
use common::{BookId, OrderId, UserId};
use domain::payment::order_reference;
use domain::{Book, GatewayPayload, Money, OrderStatus, PaymentStatus};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use store::{OrderFilter, PostgresStore, StoreExt};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_bookstore_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct PgHarness {
    store: PostgresStore,
    coordinator: CheckoutCoordinator<PostgresStore>,
    processor: ReconciliationProcessor<PostgresStore>,
    sweeper: ExpirySweeper<PostgresStore>,
}

impl PgHarness {
    /// Builds the order core over a fresh pool with cleared tables.
    async fn new() -> Self {
        let info = get_container_info().await;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(16)
            .connect(&info.connection_string)
            .await
            .unwrap();

        sqlx::query("TRUNCATE TABLE payments, order_items, orders, books")
            .execute(&pool)
            .await
            .unwrap();

        let store = PostgresStore::new(pool);
        Self {
            coordinator: CheckoutCoordinator::new(store.clone()),
            processor: ReconciliationProcessor::new(store.clone()),
            sweeper: ExpirySweeper::new(store.clone()),
            store,
        }
    }

    async fn book(&self, title: &str, price: i64, stock: u32) -> BookId {
        let book = Book::new(title, Money::new(price), stock);
        self.store.insert_book(&book).await.unwrap();
        book.id
    }

    async fn stock(&self, book_id: BookId) -> u32 {
        self.store.book(book_id).await.unwrap().unwrap().stock
    }

    async fn checkout(&self, items: Vec<CheckoutLine>) -> Result<OrderId, CheckoutError> {
        self.coordinator
            .checkout(CheckoutRequest::new(UserId::new(), items, "Jl. Asia Afrika 8, Bandung"))
            .await
            .map(|receipt| receipt.order.id)
    }

    async fn notify(
        &self,
        order_id: OrderId,
        status: &str,
        fraud: Option<&str>,
    ) -> ReconcileOutcome {
        let mut value = json!({
            "order_id": order_reference("BOOKSTORE", order_id, Utc::now()),
            "transaction_status": status,
            "payment_type": "bank_transfer",
            "transaction_id": format!("tx-{order_id}"),
        });
        if let Some(fraud) = fraud {
            value["fraud_status"] = json!(fraud);
        }
        let payload: GatewayPayload = serde_json::from_value(value).unwrap();
        self.processor.apply(payload).await.unwrap()
    }

    async fn statuses(&self, order_id: OrderId) -> (OrderStatus, PaymentStatus) {
        let order = self.store.order(order_id).await.unwrap().unwrap();
        let payment = self.store.payment_for_order(order_id).await.unwrap().unwrap();
        (order.status, payment.status)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_checkouts_never_oversell() {
    let harness = Arc::new(PgHarness::new().await);
    let n = 8;
    let book_id = harness.book("Bumi Manusia", 10_000, n - 1).await;

    let attempts = (0..n).map(|_| {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.checkout(vec![CheckoutLine::new(book_id, 1)]).await })
    });
    let results: Vec<_> = futures_util::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    let refused = results
        .iter()
        .filter(|result| matches!(result, Err(CheckoutError::InsufficientStock { .. })))
        .count();

    assert_eq!(succeeded, (n - 1) as usize);
    assert_eq!(refused, 1);
    assert_eq!(harness.stock(book_id).await, 0);
    let orders = harness.store.orders(OrderFilter::new()).await.unwrap();
    assert_eq!(orders.len(), (n - 1) as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn crossed_carts_complete_without_deadlock() {
    let harness = Arc::new(PgHarness::new().await);
    let a = harness.book("Laskar Pelangi", 10_000, 50).await;
    let b = harness.book("Sang Pemimpi", 12_000, 50).await;

    // Half the carts list the books in one order, half in the other.
    let attempts = (0..12).map(|i| {
        let harness = Arc::clone(&harness);
        let items = if i % 2 == 0 {
            vec![CheckoutLine::new(a, 1), CheckoutLine::new(b, 2)]
        } else {
            vec![CheckoutLine::new(b, 2), CheckoutLine::new(a, 1)]
        };
        tokio::spawn(async move { harness.checkout(items).await })
    });
    let results = futures_util::future::join_all(attempts).await;

    for result in results {
        result.unwrap().unwrap();
    }
    assert_eq!(harness.stock(a).await, 38);
    assert_eq!(harness.stock(b).await, 26);
}

#[tokio::test]
#[serial]
async fn worked_example_settles_once_and_rejects_late_deny() {
    let harness = PgHarness::new().await;
    let a = harness.book("A", 10_000, 5).await;
    let b = harness.book("B", 25_000, 5).await;

    let order_id = harness
        .checkout(vec![CheckoutLine::new(a, 2), CheckoutLine::new(b, 1)])
        .await
        .unwrap();
    let order = harness.store.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.total_price, Money::new(45_000));
    assert_eq!(harness.stock(a).await, 3);
    assert_eq!(harness.stock(b).await, 4);

    let outcome = harness.notify(order_id, "capture", Some("accept")).await;
    assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
    assert_eq!(
        harness.statuses(order_id).await,
        (OrderStatus::Processing, PaymentStatus::Success)
    );
    let payment = harness.store.payment_for_order(order_id).await.unwrap().unwrap();
    assert!(payment.verified_at.is_some());

    assert_eq!(
        harness.notify(order_id, "settlement", None).await,
        ReconcileOutcome::Duplicate
    );
    assert!(matches!(
        harness.notify(order_id, "deny", None).await,
        ReconcileOutcome::Rejected { .. }
    ));
    assert_eq!(
        harness.statuses(order_id).await,
        (OrderStatus::Processing, PaymentStatus::Success)
    );
    let payment = harness.store.payment_for_order(order_id).await.unwrap().unwrap();
    let raw = payment.gateway_response.unwrap();
    assert_eq!(raw.get("transaction_status"), Some(&json!("deny")));
}

#[tokio::test]
#[serial]
async fn sweep_restores_exactly_the_reserved_units() {
    let harness = PgHarness::new().await;
    let x = harness.book("X", 10_000, 10).await;
    let y = harness.book("Y", 20_000, 10).await;
    let expired = harness
        .checkout(vec![
            CheckoutLine::new(x, 2),
            CheckoutLine::new(y, 1),
            CheckoutLine::new(x, 1),
        ])
        .await
        .unwrap();
    let paid = harness.checkout(vec![CheckoutLine::new(x, 4)]).await.unwrap();
    harness.notify(paid, "settlement", None).await;

    let later = Utc::now() + Duration::hours(25);
    let report = harness.sweeper.sweep_at(later).await.unwrap();

    assert_eq!((report.scanned, report.cancelled), (1, 1));
    assert_eq!(
        harness.statuses(expired).await,
        (OrderStatus::Cancelled, PaymentStatus::Failed)
    );
    assert_eq!(harness.stock(x).await, 6);
    assert_eq!(harness.stock(y).await, 10);

    let again = harness.sweeper.sweep_at(later).await.unwrap();
    assert_eq!(again.scanned, 0);
    assert_eq!(harness.stock(x).await, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn sweep_and_settlement_race_has_one_winner() {
    let harness = Arc::new(PgHarness::new().await);

    for _ in 0..10 {
        let x = harness.book("X", 10_000, 5).await;
        let order_id = harness.checkout(vec![CheckoutLine::new(x, 2)]).await.unwrap();
        let later = Utc::now() + Duration::hours(25);

        let sweep = {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.sweeper.sweep_at(later).await.unwrap() })
        };
        let notify = {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.notify(order_id, "settlement", None).await })
        };
        let (report, outcome) = (sweep.await.unwrap(), notify.await.unwrap());

        match harness.statuses(order_id).await {
            (OrderStatus::Processing, PaymentStatus::Success) => {
                assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
                assert_eq!(report.cancelled, 0);
                assert_eq!(harness.stock(x).await, 3);
            }
            (OrderStatus::Cancelled, PaymentStatus::Failed) => {
                assert!(matches!(outcome, ReconcileOutcome::Rejected { .. }));
                assert_eq!(report.cancelled, 1);
                assert_eq!(harness.stock(x).await, 5);
            }
            other => panic!("inconsistent end state {other:?}"),
        }
    }
}
