//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the hub is serving.
    pub status: String,
    /// Seconds since the hub started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connections currently declared as `overlay`.
    pub overlays: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, overlays: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        overlays,
    }
}
