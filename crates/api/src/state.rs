//! Shared handles passed to every handler.

use std::sync::Arc;

use checkout::{CheckoutCoordinator, OrderService, PaymentGateway, ReconciliationProcessor};
use store::Store;

use crate::config::Config;

/// Application context built once at startup.
pub struct AppState<S: Store> {
    pub coordinator: CheckoutCoordinator<S>,
    pub processor: ReconciliationProcessor<S>,
    pub orders: OrderService<S>,
    pub gateway: Arc<dyn PaymentGateway>,
    /// First segment of the order references sent to the gateway.
    pub order_ref_prefix: String,
    /// Name of the storage backend, reported by `/health`.
    pub backend: &'static str,
}

impl<S: Store + Clone> AppState<S> {
    /// Wires the order core over `store`.
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        config: &Config,
        backend: &'static str,
    ) -> Self {
        Self {
            coordinator: CheckoutCoordinator::with_settings(
                store.clone(),
                config.checkout_settings(),
            ),
            processor: ReconciliationProcessor::new(store.clone()),
            orders: OrderService::new(store),
            gateway,
            order_ref_prefix: config.order_ref_prefix.clone(),
            backend,
        }
    }
}
