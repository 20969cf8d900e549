//! A single hub client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use overcast_core::HubInbound;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastManager;
use super::connection::ClientConnection;
use crate::metrics::{
    HUB_CONNECTION_DURATION_SECONDS, HUB_CONNECTIONS_ACTIVE, HUB_CONNECTIONS_TOTAL,
    HUB_DISCONNECTIONS_TOTAL, HUB_HEARTBEAT_TIMEOUTS_TOTAL,
};

/// How long the write task gets to flush a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-session limits derived from [`HubConfig`](crate::config::HubConfig).
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is dropped.
    pub heartbeat_timeout: Duration,
    /// Outbound queue capacity.
    pub send_queue_capacity: usize,
}

/// Run a hub session for a connected client.
///
/// 1. Registers the connection (role `unknown`) and broadcasts the overlay count
/// 2. Decodes each inbound frame once: `hello` updates roles, anything else is relayed
/// 3. Forwards queued frames to the socket and sends periodic Pings
/// 4. On close, error, heartbeat timeout or hub shutdown, unregisters and,
///    unless the hub is stopping, re-broadcasts the overlay count
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_hub_session(
    ws: WebSocket,
    conn_id: String,
    hub: Arc<BroadcastManager>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    if shutdown.is_cancelled() {
        return;
    }
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(limits.send_queue_capacity.max(1));
    let cancel = shutdown.child_token();
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx, cancel.clone()));

    info!("client connected");
    counter!(HUB_CONNECTIONS_TOTAL).increment(1);
    gauge!(HUB_CONNECTIONS_ACTIVE).increment(1.0);

    hub.add(connection.clone()).await;
    hub.broadcast_overlay_status().await;

    let outbound_conn = connection.clone();
    let outbound_cancel = cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(limits.heartbeat_interval);
        // first tick fires immediately
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                biased;
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_seen_elapsed() > limits.heartbeat_timeout
                    {
                        warn!(timeout = ?limits.heartbeat_timeout, "client unresponsive, disconnecting");
                        counter!(HUB_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        // a dead writer takes the reader down with it
        outbound_cancel.cancel();
    });

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let text: Arc<str> = match msg {
            Message::Text(t) => Arc::from(t.as_str()),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(s) => Arc::from(s),
                Err(_) => {
                    debug!(len = data.len(), "dropping non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match HubInbound::decode(&text) {
            HubInbound::Hello { role } => hub.declare_role(&connection, role).await,
            HubInbound::Relay => hub.relay(text).await,
        }
    }

    cancel.cancel();
    let abort = outbound.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, outbound).await.is_err() {
        abort.abort();
    }

    hub.remove(&conn_id).await;
    info!(
        role = %connection.role(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(HUB_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(HUB_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(HUB_CONNECTION_DURATION_SECONDS).record(connection.connected_at.elapsed().as_secs_f64());

    if !shutdown.is_cancelled() {
        hub.broadcast_overlay_status().await;
    }
}
