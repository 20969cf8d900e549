//! Runtime configuration for one telemetry link.

use std::time::Duration;

use overcast_settings::TelemetrySettings;

/// Connection parameters captured at [`TelemetryClient::start`](crate::TelemetryClient::start).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// WebSocket URL of the telemetry source.
    pub url: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Log every inbound event at info level.
    pub debug: bool,
    /// When set, only events whose name contains this are logged.
    pub debug_filter: Option<String>,
}

impl TelemetryConfig {
    /// Config for `url` with default timing and logging.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Whether an inbound `event` should be logged.
    pub fn should_log(&self, event: &str) -> bool {
        self.debug
            && self
                .debug_filter
                .as_deref()
                .is_none_or(|filter| filter.is_empty() || event.contains(filter))
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&TelemetrySettings::default())
    }
}

impl From<&TelemetrySettings> for TelemetryConfig {
    fn from(s: &TelemetrySettings) -> Self {
        Self {
            url: s.url.clone(),
            reconnect_delay: s.reconnect_delay(),
            debug: s.debug,
            debug_filter: s.debug_filter.clone(),
        }
    }
}
