//! Metric names emitted by the telemetry client.

/// Reconnect attempts after the first connection attempt.
pub const TELEMETRY_RECONNECTS_TOTAL: &str = "telemetry_reconnects_total";
/// Inbound events dispatched (label: `channel`).
pub const TELEMETRY_EVENTS_TOTAL: &str = "telemetry_events_total";
