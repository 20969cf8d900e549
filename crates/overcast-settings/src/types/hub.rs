use overcast_core::constants::DEFAULT_HUB_PORT;
use serde::{Deserialize, Serialize};

/// Broadcast hub listener and per-connection limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// A client silent for longer than this is disconnected.
    pub heartbeat_timeout_secs: u64,
    /// Bounded outbound queue per connection.
    pub send_queue_capacity: usize,
    /// Total drops after which a slow client is disconnected.
    pub max_dropped_messages: u64,
    /// Serve `GET /metrics` in Prometheus text format.
    pub metrics_enabled: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_HUB_PORT,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_queue_capacity: 256,
            max_dropped_messages: 1024,
            metrics_enabled: true,
        }
    }
}

impl HubSettings {
    /// Client URL of this hub (`ws://host:port/`).
    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_loopback() {
        let hub = HubSettings::default();
        assert_eq!(hub.host, "127.0.0.1");
        assert_eq!(hub.port, 49322);
        assert_eq!(hub.url(), "ws://127.0.0.1:49322/");
    }
}
