//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{AppState, Config};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::InMemoryPaymentGateway;
use chrono::Utc;
use common::{BookId, UserId};
use domain::payment::order_reference;
use domain::{Book, Money};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
    gateway: InMemoryPaymentGateway,
    book_a: BookId,
    book_b: BookId,
}

async fn setup() -> TestApp {
    let store = InMemoryStore::new();
    let a = Book::new("Laskar Pelangi", Money::new(10_000), 5);
    let b = Book::new("Bumi Manusia", Money::new(25_000), 1);
    let (book_a, book_b) = (a.id, b.id);
    store.insert_book(a).await;
    store.insert_book(b).await;

    let gateway = InMemoryPaymentGateway::new();
    let state = Arc::new(AppState::new(
        store.clone(),
        Arc::new(gateway.clone()),
        &Config::default(),
        "memory",
    ));
    let app = api::create_app(state, get_metrics_handle());

    TestApp {
        app,
        store,
        gateway,
        book_a,
        book_b,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn place_order(test: &TestApp, user_id: UserId) -> (StatusCode, Value) {
    send(
        &test.app,
        "POST",
        "/checkout",
        Some(json!({
            "user_id": user_id,
            "items": [
                {"book_id": test.book_a, "quantity": 2},
                {"book_id": test.book_b, "quantity": 1}
            ],
            "shipping_address": "Jl. Malioboro 3, Yogyakarta",
            "notes": "leave at the gate",
            "customer": {"name": "Sari", "email": "sari@example.com", "phone": "0812"}
        })),
    )
    .await
}

fn settlement(order_id: &str, status: &str) -> Value {
    json!({
        "order_id": order_reference("BOOKSTORE", order_id.parse().unwrap(), Utc::now()),
        "transaction_status": status,
        "payment_type": "gopay",
        "transaction_id": "tx-1",
    })
}

#[tokio::test]
async fn test_health_check() {
    let test = setup().await;

    let (status, json) = send(&test.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_checkout_creates_order_and_payment_page() {
    let test = setup().await;

    let (status, json) = place_order(&test, UserId::new()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["total_price"], 45_000);
    assert_eq!(json["currency"], "IDR");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["payment_token"], "TOKEN-0001");
    assert!(json["redirect_url"].as_str().is_some());

    assert_eq!(test.store.stock_of(test.book_a).await, Some(3));
    assert_eq!(test.store.stock_of(test.book_b).await, Some(0));

    let request = test.gateway.last_request().unwrap();
    assert_eq!(request.customer.email, "sari@example.com");
    assert_eq!(request.items[1].name, "Bumi Manusia");
}

#[tokio::test]
async fn test_checkout_insufficient_stock_is_conflict() {
    let test = setup().await;
    place_order(&test, UserId::new()).await;

    let (status, json) = place_order(&test, UserId::new()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("Bumi Manusia"));
    assert_eq!(test.store.stock_of(test.book_a).await, Some(3));
}

#[tokio::test]
async fn test_checkout_rejects_malformed_body() {
    let test = setup().await;

    let (status, json) = send(
        &test.app,
        "POST",
        "/checkout",
        Some(json!({"user_id": "nope", "items": [], "shipping_address": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = send(
        &test.app,
        "POST",
        "/checkout",
        Some(json!({"user_id": UserId::new(), "items": [], "shipping_address": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &test.app,
        "POST",
        "/checkout",
        Some(json!({
            "user_id": UserId::new(),
            "items": [{"book_id": test.book_a, "quantity": 4_000_000_000u32}],
            "shipping_address": "x"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(test.store.stock_of(test.book_a).await, Some(5));
}

#[tokio::test]
async fn test_checkout_gateway_failure_keeps_pending_order() {
    let test = setup().await;
    test.gateway.set_fail_on_create(true);
    let user_id = UserId::new();

    let (status, json) = place_order(&test, user_id).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("was created"));

    let (status, orders) = send(&test.app, "GET", &format!("/users/{user_id}/orders"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["status"], "pending");
}

#[tokio::test]
async fn test_notification_settles_order() {
    let test = setup().await;
    let (_, created) = place_order(&test, UserId::new()).await;
    let order_id = created["order_id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &test.app,
        "POST",
        "/payments/notification",
        Some(settlement(&order_id, "settlement")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["outcome"]["result"], "applied");

    let (status, replay) = send(
        &test.app,
        "POST",
        "/payments/notification",
        Some(settlement(&order_id, "settlement")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["outcome"]["result"], "duplicate");

    let (status, order) = send(&test.app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "diproses");
    assert_eq!(order["payment"]["status"], "success");
    assert_eq!(order["payment"]["payment_method"], "gopay");
    assert!(order["payment"]["verified_at"].is_string());
}

#[tokio::test]
async fn test_notification_errors_are_not_acknowledged() {
    let test = setup().await;

    let (status, _) = send(
        &test.app,
        "POST",
        "/payments/notification",
        Some(json!({"order_id": "BOOKSTORE-garbage-1", "transaction_status": "settlement"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = common::OrderId::new().to_string();
    let (status, _) = send(
        &test.app,
        "POST",
        "/payments/notification",
        Some(settlement(&unknown, "settlement")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fulfilment_status_updates() {
    let test = setup().await;
    let (_, created) = place_order(&test, UserId::new()).await;
    let order_id = created["order_id"].as_str().unwrap().to_string();
    let uri = format!("/orders/{order_id}/status");

    let (status, _) = send(&test.app, "PATCH", &uri, Some(json!({"status": "dikirim"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
        &test.app,
        "POST",
        "/payments/notification",
        Some(settlement(&order_id, "settlement")),
    )
    .await;

    let (status, order) = send(&test.app, "PATCH", &uri, Some(json!({"status": "dikirim"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "dikirim");

    let (status, _) = send(&test.app, "PATCH", &uri, Some(json!({"status": "shipped"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_orders_by_status() {
    let test = setup().await;
    let (_, created) = place_order(&test, UserId::new()).await;
    let order_id = created["order_id"].as_str().unwrap().to_string();

    let (status, pending) = send(&test.app, "GET", "/orders?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending[0]["id"], order_id.as_str());
    assert_eq!(pending[0]["items"].as_array().unwrap().len(), 2);

    let (_, cancelled) = send(&test.app, "GET", "/orders?status=batal", None).await;
    assert!(cancelled.as_array().unwrap().is_empty());

    let (status, _) = send(&test.app, "GET", "/orders?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_order_errors() {
    let test = setup().await;

    let (status, _) = send(&test.app, "GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = common::OrderId::new();
    let (status, json) = send(&test.app, "GET", &format!("/orders/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let test = setup().await;
    place_order(&test, UserId::new()).await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_total"));
}
