//! Prometheus metrics recorder and metric names for the hub.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `GET /metrics`. Call once at startup
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Hub connections opened (counter).
pub const HUB_CONNECTIONS_TOTAL: &str = "hub_connections_total";
/// Hub connections closed (counter).
pub const HUB_DISCONNECTIONS_TOTAL: &str = "hub_disconnections_total";
/// Open hub connections (gauge).
pub const HUB_CONNECTIONS_ACTIVE: &str = "hub_connections_active";
/// Frames relayed, counted once per inbound frame (counter).
pub const HUB_MESSAGES_RELAYED_TOTAL: &str = "hub_messages_relayed_total";
/// Outbound frames dropped on a full queue (counter).
pub const HUB_SEND_DROPS_TOTAL: &str = "hub_send_drops_total";
/// Clients disconnected for exceeding the drop limit (counter).
pub const HUB_SLOW_CLIENT_DISCONNECTS_TOTAL: &str = "hub_slow_client_disconnects_total";
/// Clients disconnected for missing heartbeats (counter).
pub const HUB_HEARTBEAT_TIMEOUTS_TOTAL: &str = "hub_heartbeat_timeouts_total";
/// Connections declared as `overlay` (gauge).
pub const HUB_OVERLAY_CLIENTS: &str = "hub_overlay_clients";
/// Hub connection lifetime (histogram).
pub const HUB_CONNECTION_DURATION_SECONDS: &str = "hub_connection_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            HUB_CONNECTIONS_TOTAL,
            HUB_DISCONNECTIONS_TOTAL,
            HUB_CONNECTIONS_ACTIVE,
            HUB_MESSAGES_RELAYED_TOTAL,
            HUB_SEND_DROPS_TOTAL,
            HUB_SLOW_CLIENT_DISCONNECTS_TOTAL,
            HUB_HEARTBEAT_TIMEOUTS_TOTAL,
            HUB_OVERLAY_CLIENTS,
            HUB_CONNECTION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(name.starts_with("hub_"));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }
}
