//! Hub configuration.

use std::time::Duration;

use overcast_settings::HubSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the broadcast hub.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for longer than this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Bounded outbound queue per connection.
    pub send_queue_capacity: usize,
    /// Total drops after which a slow client is disconnected.
    pub max_dropped_messages: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&HubSettings::default())
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(s: &HubSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            send_queue_capacity: s.send_queue_capacity,
            max_dropped_messages: s.max_dropped_messages,
        }
    }
}

impl HubConfig {
    /// `host:port` bind string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub(crate) fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }
}
