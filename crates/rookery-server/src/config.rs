//! Server configuration loaded from environment variables.
//!
//! - `ROOKERY_ADDR`: listen address. Default: `127.0.0.1:7668`
//! - `ROOKERY_DELIVERY_TIMEOUT_MS`: how long a pushed message may wait for
//!   the client's acknowledgement before the delivery counts as failed and
//!   the destination is demoted to a mailbox. Default: `5000`

use std::time::Duration;

use tracing::info;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7668";

/// Default delivery acknowledgement timeout in milliseconds.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub addr: String,
    /// Timeout for one message delivery round-trip to a client.
    pub delivery_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let addr = std::env::var("ROOKERY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

        let delivery_timeout_ms = std::env::var("ROOKERY_DELIVERY_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_MS);

        Self {
            addr,
            delivery_timeout: Duration::from_millis(delivery_timeout_ms),
        }
    }

    /// Log the active configuration at startup.
    pub fn log_config(&self) {
        info!("Listen address: {}", self.addr);
        info!(
            "Delivery timeout: {} ms",
            self.delivery_timeout.as_millis()
        );
    }
}
