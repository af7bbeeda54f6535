//! Payment record, its lifecycle, and inbound gateway notifications.

mod model;
mod notification;
mod state;

pub use model::{GatewayPayload, Payment};
pub use notification::{
    GatewayNotification, NotificationError, StatusTarget, is_valid_reference_prefix,
    map_gateway_status, order_reference,
};
pub use state::{PaymentStatus, StatusChange};
