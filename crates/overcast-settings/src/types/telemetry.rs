use std::time::Duration;

use overcast_core::constants::{DEFAULT_TELEMETRY_PORT, MIN_RECONNECT_DELAY_MS};
use serde::{Deserialize, Serialize};

/// Game telemetry source connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// WebSocket URL of the telemetry source.
    pub url: String,
    /// Fixed delay between reconnect attempts, in ms.
    pub reconnect_delay_ms: u64,
    /// Log every inbound event at info level.
    pub debug: bool,
    /// Only log events whose name contains this substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_filter: Option<String>,
}

impl TelemetrySettings {
    /// Reconnect delay, never below [`MIN_RECONNECT_DELAY_MS`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(MIN_RECONNECT_DELAY_MS))
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{DEFAULT_TELEMETRY_PORT}"),
            reconnect_delay_ms: 2000,
            debug: false,
            debug_filter: None,
        }
    }
}
