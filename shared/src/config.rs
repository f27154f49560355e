//! Tunables for the messaging layer

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Messaging configuration shared by server and client
///
/// Every field has a default, so a TOML file only needs to list the values
/// it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Maximum number of unacknowledged reliable messages per sender
    pub window_size: usize,
    /// Age after which a pending message is handed to the retry channel
    pub ack_timeout_ms: u64,
    /// Period of the pending-message timeout scan
    pub timeout_scan_interval_ms: u64,
    /// Period of the ACK batch flush
    pub ack_flush_interval_ms: u64,
    /// Re-transmissions attempted before a message is abandoned
    pub max_retries: u32,
    /// Size of the server's dispatch worker pool
    pub worker_count: usize,
    /// Receive buffer for a single datagram
    pub recv_buffer_size: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            window_size: 64,
            ack_timeout_ms: 500,
            timeout_scan_interval_ms: 100,
            ack_flush_interval_ms: 2,
            max_retries: 5,
            worker_count: 8,
            recv_buffer_size: 2048,
        }
    }
}

impl MessagingConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn timeout_scan_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_scan_interval_ms.max(1))
    }

    pub fn ack_flush_interval(&self) -> Duration {
        Duration::from_millis(self.ack_flush_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = MessagingConfig::default();
        assert_eq!(config.window_size, 64);
        assert_eq!(config.ack_timeout(), Duration::from_millis(500));
        assert_eq!(config.ack_flush_interval(), Duration::from_millis(2));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = assert_ok!(MessagingConfig::from_toml_str(
            "window_size = 4\nack_timeout_ms = 250\n"
        ));
        assert_eq!(config.window_size, 4);
        assert_eq!(config.ack_timeout_ms, 250);
        assert_eq!(config.max_retries, MessagingConfig::default().max_retries);
    }

    #[test]
    fn test_invalid_toml() {
        let err = assert_err!(MessagingConfig::from_toml_str("window_size = \"many\""));
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = MessagingConfig {
            ack_flush_interval_ms: 0,
            timeout_scan_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.ack_flush_interval(), Duration::from_millis(1));
        assert_eq!(config.timeout_scan_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(MessagingConfig::from_toml_file("/nonexistent/messaging.toml"));
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
