//! Server configuration.

use crate::protocol::MAX_HEARTBEAT;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for a [`BraidLayer`](super::BraidLayer).
///
/// Every field has a default, so a partial configuration file deserializes
/// cleanly:
///
/// ```
/// use braid_axum_server::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{"max_subscriptions": 10}"#).unwrap();
/// assert_eq!(config.max_subscriptions, 10);
/// assert!(config.enable_subscriptions);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Honor `Subscribe` on GET. When disabled, subscribing GETs are served as plain GETs.
    pub enable_subscriptions: bool,

    /// Maximum number of live subscriptions across all resources.
    pub max_subscriptions: usize,

    /// Default heartbeat interval in seconds for subscription streams (0 = off).
    ///
    /// A request's `Heartbeats` header takes precedence. Values above one
    /// day are clamped.
    pub heartbeat_interval: u64,

    /// Undelivered updates a subscriber may accumulate before it is dropped
    /// as unresponsive (0 = unbounded).
    pub max_queued_updates: usize,

    /// Largest PUT body buffered for decoding, in bytes.
    pub max_body_bytes: usize,

    /// Answer OPTIONS requests with 204 and the capability headers.
    pub answer_options: bool,
}

impl ServerConfig {
    /// The configured default heartbeat, if enabled.
    #[must_use]
    pub fn default_heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_interval > 0)
            .then(|| Duration::from_secs(self.heartbeat_interval).min(MAX_HEARTBEAT))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            enable_subscriptions: true,
            max_subscriptions: 1000,
            heartbeat_interval: 0,
            max_queued_updates: 1000,
            max_body_bytes: 2 * 1024 * 1024,
            answer_options: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.enable_subscriptions);
        assert_eq!(config.max_subscriptions, 1000);
        assert_eq!(config.heartbeat_interval, 0);
        assert_eq!(config.max_queued_updates, 1000);
        assert!(config.answer_options);
        assert!(config.default_heartbeat().is_none());
    }

    #[test]
    fn test_default_heartbeat_enabled() {
        let config = ServerConfig {
            heartbeat_interval: 30,
            ..Default::default()
        };
        assert_eq!(config.default_heartbeat(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"enable_subscriptions": false, "max_body_bytes": 16}"#)
                .unwrap();
        assert!(!config.enable_subscriptions);
        assert_eq!(config.max_body_bytes, 16);
        assert_eq!(config.max_subscriptions, 1000);
    }

    #[test]
    fn test_default_heartbeat_clamped() {
        let config = ServerConfig {
            heartbeat_interval: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.default_heartbeat(), Some(MAX_HEARTBEAT));
    }

    #[test]
    fn test_deserialize_queue_limit() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"max_queued_updates": 0}"#).unwrap();
        assert_eq!(config.max_queued_updates, 0);
    }
}
