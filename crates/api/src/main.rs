//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config, LogFormat};
use checkout::{ExpirySweeper, InMemoryPaymentGateway, PaymentGateway, SnapGateway};
use domain::{Book, Money};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match &config.midtrans_server_key {
        Some(server_key) => {
            let gateway = SnapGateway::new(server_key.clone(), config.midtrans_is_production);
            tracing::info!(endpoint = gateway.endpoint(), "using Midtrans Snap gateway");
            Arc::new(gateway)
        }
        None => {
            tracing::warn!("MIDTRANS_SERVER_KEY not set, using in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

/// Demo catalog for runs without a database.
async fn seed_demo_books(store: &InMemoryStore) {
    let books = [
        ("Laskar Pelangi", 89_000, 25),
        ("Bumi Manusia", 132_000, 10),
        ("Cantik Itu Luka", 115_000, 5),
        ("Pulang", 95_000, 1),
    ];

    for (title, price, stock) in books {
        let book = Book::new(title, Money::new(price), stock);
        tracing::info!(book_id = %book.id, title, stock, "seeded demo book");
        store.insert_book(book).await;
    }
}

/// Serves the API and runs the expiry sweep until a shutdown signal arrives.
async fn serve<S: Store + Clone + 'static>(
    store: S,
    backend: &'static str,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(
        store.clone(),
        build_gateway(config),
        config,
        backend,
    ));
    let app = api::create_app(state, metrics_handle);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(store)
        .with_interval(config.sweep_interval())
        .with_batch_size(config.sweep_batch_size);
    let sweeper_task = tokio::spawn(async move {
        sweeper
            .run(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await;
    });

    let addr = config.addr();
    tracing::info!(%addr, backend, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the storage backend and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");

            serve(store, "postgres", &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store = InMemoryStore::new();
            seed_demo_books(&store).await;

            serve(store, "memory", &config, metrics_handle).await;
        }
    }
}
