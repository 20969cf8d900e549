//! Fan-out to connected hub clients and overlay role tracking.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use overcast_core::Role;
use overcast_core::envelope::overlay_status_message;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, SendOutcome};
use super::roles::RoleRegistry;
use crate::metrics::{
    HUB_MESSAGES_RELAYED_TOTAL, HUB_OVERLAY_CLIENTS, HUB_SEND_DROPS_TOTAL,
    HUB_SLOW_CLIENT_DISCONNECTS_TOTAL,
};

/// Owns the live connection map and the overlay role registry.
pub struct BroadcastManager {
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    roles: Mutex<RoleRegistry>,
    max_dropped_messages: u64,
}

impl BroadcastManager {
    /// Create a manager that disconnects clients after `max_dropped_messages`
    /// total queue-full drops.
    pub fn new(max_dropped_messages: u64) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            roles: Mutex::new(RoleRegistry::new()),
            max_dropped_messages,
        }
    }

    /// Register a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Unregister a connection and drop its overlay membership.
    pub async fn remove(&self, connection_id: &str) {
        let _ = self.connections.write().await.remove(connection_id);
        let was_overlay = self.roles.lock().remove(connection_id);
        if was_overlay {
            debug!(conn_id = connection_id, "overlay client left");
        }
    }

    /// Apply a `hello` from `connection` and re-broadcast the overlay count.
    ///
    /// A different role after a declared one is ignored.
    pub async fn declare_role(&self, connection: &ClientConnection, role: Role) {
        if !connection.try_declare(&role) {
            warn!(
                conn_id = %connection.id,
                current = %connection.role(),
                requested = %role,
                "ignoring role change on declared connection"
            );
            return;
        }
        self.roles.lock().declare(&connection.id, &role);
        info!(conn_id = %connection.id, %role, "role declared");
        self.broadcast_overlay_status().await;
    }

    /// Send `{"type":"overlayStatus","overlays":N}` to everyone.
    pub async fn broadcast_overlay_status(&self) {
        let overlays = self.overlay_count();
        #[allow(clippy::cast_precision_loss)]
        gauge!(HUB_OVERLAY_CLIENTS).set(overlays as f64);
        let message: Arc<str> = overlay_status_message(overlays).into();
        self.send_all(&message).await;
    }

    /// Relay a raw frame to every open connection, sender included.
    pub async fn relay(&self, message: Arc<str>) {
        counter!(HUB_MESSAGES_RELAYED_TOTAL).increment(1);
        self.send_all(&message).await;
    }

    async fn send_all(&self, message: &Arc<str>) {
        let conns = self.connections.read().await;
        debug!(recipients = conns.len(), len = message.len(), "fan-out");
        for conn in conns.values() {
            if conn.is_closing() {
                continue;
            }
            match conn.send(Arc::clone(message)) {
                SendOutcome::Queued | SendOutcome::Closed => {}
                SendOutcome::Dropped(total) => {
                    counter!(HUB_SEND_DROPS_TOTAL).increment(1);
                    if total > self.max_dropped_messages {
                        warn!(conn_id = %conn.id, dropped = total, "slow client, disconnecting");
                        counter!(HUB_SLOW_CLIENT_DISCONNECTS_TOTAL).increment(1);
                        conn.disconnect();
                    }
                }
            }
        }
    }

    /// Live overlay count, read from the registry.
    pub fn overlay_count(&self) -> usize {
        self.roles.lock().overlay_count()
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every connection and forget all state.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (_, conn) in &drained {
            conn.disconnect();
        }
        self.roles.lock().clear();
        info!(closed = drained.len(), "closed all hub connections");
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn make_connection(id: &str, cap: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(cap);
        (
            Arc::new(ClientConnection::new(id.into(), tx, CancellationToken::new())),
            rx,
        )
    }

    fn overlays_in(msg: &str) -> u64 {
        let v: serde_json::Value = serde_json::from_str(msg).unwrap();
        assert_eq!(v["type"], "overlayStatus");
        v["overlays"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn add_and_remove() {
        let bm = BroadcastManager::new(10);
        let (conn, _rx) = make_connection("c1", 4);
        bm.add(conn).await;
        assert_eq!(bm.connection_count().await, 1);
        bm.remove("c1").await;
        bm.remove("c1").await;
        assert_eq!(bm.connection_count().await, 0);
    }

    #[tokio::test]
    async fn relay_reaches_everyone_including_sender() {
        let bm = BroadcastManager::new(10);
        let (a, mut rx_a) = make_connection("a", 4);
        let (b, mut rx_b) = make_connection("b", 4);
        bm.add(a).await;
        bm.add(b).await;

        bm.relay(Arc::from(r#"{"type":"score"}"#)).await;
        assert_eq!(&*rx_a.try_recv().unwrap(), r#"{"type":"score"}"#);
        assert_eq!(&*rx_b.try_recv().unwrap(), r#"{"type":"score"}"#);
    }

    #[tokio::test]
    async fn declare_overlay_broadcasts_count() {
        let bm = BroadcastManager::new(10);
        let (a, mut rx_a) = make_connection("a", 4);
        bm.add(a.clone()).await;

        bm.declare_role(&a, Role::Overlay).await;
        assert_eq!(overlays_in(&rx_a.try_recv().unwrap()), 1);
        assert_eq!(bm.overlay_count(), 1);
    }

    #[tokio::test]
    async fn conflicting_declaration_is_ignored_with_a_warning() {
        let (logs, _guard) = overcast_core::logging::capture_logs();
        let bm = BroadcastManager::new(10);
        let (a, mut rx_a) = make_connection("a", 4);
        bm.add(a.clone()).await;

        bm.declare_role(&a, Role::Overlay).await;
        let _ = rx_a.try_recv().unwrap();
        bm.declare_role(&a, Role::Control).await;
        assert!(rx_a.try_recv().is_err());
        assert_eq!(bm.overlay_count(), 1);
        assert_eq!(a.role(), Role::Overlay);
        assert!(logs.has_event(tracing::Level::WARN, "ignoring role change"));
    }

    #[tokio::test]
    async fn remove_drops_overlay_membership() {
        let bm = BroadcastManager::new(10);
        let (a, _rx_a) = make_connection("a", 4);
        bm.add(a.clone()).await;
        bm.declare_role(&a, Role::Overlay).await;
        bm.remove("a").await;
        assert_eq!(bm.overlay_count(), 0);
    }

    #[tokio::test]
    async fn slow_client_is_disconnected_after_limit() {
        let bm = BroadcastManager::new(2);
        let (slow, _rx_slow) = make_connection("slow", 1);
        let (fast, mut rx_fast) = make_connection("fast", 16);
        bm.add(slow.clone()).await;
        bm.add(fast).await;

        for i in 0..4 {
            bm.relay(Arc::from(format!("{i}"))).await;
        }
        // queue holds 1, drops 1..=3; third drop exceeds the limit of 2
        assert_eq!(slow.drop_count(), 3);
        assert!(slow.is_closing());
        for i in 0..4 {
            assert_eq!(&*rx_fast.try_recv().unwrap(), i.to_string());
        }
    }

    #[tokio::test]
    async fn closed_queue_is_swallowed() {
        let bm = BroadcastManager::new(10);
        let (a, rx_a) = make_connection("a", 4);
        drop(rx_a);
        bm.add(a.clone()).await;
        bm.relay(Arc::from("x")).await;
        assert!(!a.is_closing());
        assert_eq!(a.drop_count(), 0);
    }

    #[tokio::test]
    async fn close_all_disconnects_and_clears() {
        let bm = BroadcastManager::new(10);
        let (a, _rx_a) = make_connection("a", 4);
        bm.add(a.clone()).await;
        bm.declare_role(&a, Role::Overlay).await;
        bm.close_all().await;
        assert!(a.is_closing());
        assert_eq!(bm.connection_count().await, 0);
        assert_eq!(bm.overlay_count(), 0);
    }
}
