pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{
    ExpiredPayment, InventoryGuard, OrderFilter, OrderStore, PaymentStore, ReserveOutcome, Store,
    StoreExt, Transaction,
};
