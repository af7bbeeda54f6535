//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::CheckoutSettings;
use domain::payment::is_valid_reference_prefix;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on an in-memory store with demo books
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `PAYMENT_TTL_HOURS`: time to pay before the sweep cancels (default: `24`)
/// - `SWEEP_INTERVAL_SECS`: time between expiry sweeps (default: `300`)
/// - `SWEEP_BATCH_SIZE`: payments handled per sweep (default: `100`)
/// - `ORDER_REF_PREFIX`: first segment of gateway order references, no `-` (default: `"BOOKSTORE"`)
/// - `CURRENCY`: payment currency (default: `"IDR"`)
/// - `MIDTRANS_SERVER_KEY`: Snap server key; unset uses an in-memory gateway
/// - `MIDTRANS_IS_PRODUCTION`: `true` for the production Snap endpoint (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payment_ttl_hours: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub order_ref_prefix: String,
    pub currency: String,
    pub midtrans_server_key: Option<String>,
    pub midtrans_is_production: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup, falling back to defaults.
    ///
    /// Unparseable values fall back to the default as well.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse(non_empty("PORT")).unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse(non_empty("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            payment_ttl_hours: parse(non_empty("PAYMENT_TTL_HOURS"))
                .filter(|hours: &i64| *hours > 0)
                .unwrap_or(defaults.payment_ttl_hours),
            sweep_interval_secs: parse(non_empty("SWEEP_INTERVAL_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(defaults.sweep_interval_secs),
            sweep_batch_size: parse(non_empty("SWEEP_BATCH_SIZE"))
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.sweep_batch_size),
            order_ref_prefix: non_empty("ORDER_REF_PREFIX")
                .filter(|prefix| is_valid_reference_prefix(prefix))
                .unwrap_or(defaults.order_ref_prefix),
            currency: non_empty("CURRENCY").unwrap_or(defaults.currency),
            midtrans_server_key: non_empty("MIDTRANS_SERVER_KEY"),
            midtrans_is_production: parse(non_empty("MIDTRANS_IS_PRODUCTION"))
                .unwrap_or(defaults.midtrans_is_production),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for new orders and payments.
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            payment_ttl: chrono::Duration::hours(self.payment_ttl_hours),
            currency: self.currency.clone(),
        }
    }

    /// Time between two expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            payment_ttl_hours: 24,
            sweep_interval_secs: 300,
            sweep_batch_size: 100,
            order_ref_prefix: "BOOKSTORE".to_string(),
            currency: "IDR".to_string(),
            midtrans_server_key: None,
            midtrans_is_production: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.sweep_batch_size, 100);
        assert_eq!(config.order_ref_prefix, "BOOKSTORE");
        assert!(config.midtrans_server_key.is_none());
        assert!(!config.midtrans_is_production);

        let settings = config.checkout_settings();
        assert_eq!(settings.payment_ttl, chrono::Duration::hours(24));
        assert_eq!(settings.currency, "IDR");
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/books"),
            ("PAYMENT_TTL_HOURS", "2"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("MIDTRANS_SERVER_KEY", "SB-Mid-server-x"),
            ("MIDTRANS_IS_PRODUCTION", "true"),
            ("ORDER_REF_PREFIX", "TOKOBUKU"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/books")
        );
        assert_eq!(config.payment_ttl_hours, 2);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.midtrans_server_key.as_deref(), Some("SB-Mid-server-x"));
        assert!(config.midtrans_is_production);
        assert_eq!(config.order_ref_prefix, "TOKOBUKU");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("SWEEP_BATCH_SIZE", "0"),
            ("PAYMENT_TTL_HOURS", "-5"),
            ("DATABASE_URL", "  "),
            ("ORDER_REF_PREFIX", "MY-SHOP"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.order_ref_prefix, "BOOKSTORE");
        assert_eq!(config.sweep_batch_size, 100);
        assert_eq!(config.payment_ttl_hours, 24);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
