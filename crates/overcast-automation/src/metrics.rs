//! Metric names emitted by the automation relay.

/// obs-websocket connection attempts (handshakes started).
pub const OBS_CONNECT_ATTEMPTS_TOTAL: &str = "obs_connect_attempts_total";
/// Scene switches that failed at the streaming tool.
pub const OBS_COMMAND_FAILURES_TOTAL: &str = "obs_command_failures_total";
/// Scene switches that completed (label: `trigger`).
pub const OBS_SCENE_SWITCHES_TOTAL: &str = "obs_scene_switches_total";
/// Hub link reconnect attempts.
pub const HUB_LINK_RECONNECTS_TOTAL: &str = "hub_link_reconnects_total";
