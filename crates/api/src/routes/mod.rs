//! HTTP route handlers.

pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path, query or body parameter, naming `what` on failure.
fn parse_param<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
