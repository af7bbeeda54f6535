use checkout::{CheckoutCoordinator, CheckoutLine, CheckoutRequest, ReconciliationProcessor};
use chrono::Utc;
use common::{BookId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::payment::order_reference;
use domain::{Book, GatewayPayload, Money};
use store::InMemoryStore;

fn seeded_store(rt: &tokio::runtime::Runtime, stock: u32) -> (InMemoryStore, Vec<BookId>) {
    let store = InMemoryStore::new();
    let ids = rt.block_on(async {
        let mut ids = Vec::new();
        for i in 0..3 {
            let book = Book::new(format!("Bench Book {i}"), Money::new(10_000 * (i + 1)), stock);
            ids.push(book.id);
            store.insert_book(book).await;
        }
        ids
    });
    (store, ids)
}

fn bench_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, ids) = seeded_store(&rt, u32::MAX / 2);
    let coordinator = CheckoutCoordinator::new(store);
    let items: Vec<CheckoutLine> = ids.iter().map(|id| CheckoutLine::new(*id, 1)).collect();

    c.bench_function("checkout/three_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator
                    .checkout(CheckoutRequest::new(
                        UserId::new(),
                        items.clone(),
                        "Bench Street 1",
                    ))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout_and_settle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, ids) = seeded_store(&rt, u32::MAX / 2);
    let coordinator = CheckoutCoordinator::new(store.clone());
    let processor = ReconciliationProcessor::new(store);

    c.bench_function("checkout/checkout_then_settlement", |b| {
        b.iter(|| {
            rt.block_on(async {
                let receipt = coordinator
                    .checkout(CheckoutRequest::new(
                        UserId::new(),
                        vec![CheckoutLine::new(ids[0], 1)],
                        "Bench Street 1",
                    ))
                    .await
                    .unwrap();

                let mut raw = GatewayPayload::new();
                raw.insert(
                    "order_id".into(),
                    order_reference("BENCH", receipt.order.id, Utc::now()).into(),
                );
                raw.insert("transaction_status".into(), "settlement".into());
                processor.apply(raw).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_checkout, bench_checkout_and_settle);
criterion_main!(benches);
