//! Order aggregate and its lifecycle.

mod model;
mod state;

pub use model::{Order, OrderLine};
pub use state::OrderStatus;
