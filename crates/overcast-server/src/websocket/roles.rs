//! Overlay role registry.

use std::collections::HashSet;

use overcast_core::Role;

/// Set of connection ids currently declared as `overlay`.
///
/// The broadcast overlay count is always this set's cardinality, so it
/// cannot drift from the live membership.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    overlays: HashSet<String>,
}

impl RoleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `role` for `conn_id`: drop any prior membership, then re-add
    /// if the role is `overlay`.
    pub fn declare(&mut self, conn_id: &str, role: &Role) {
        let _ = self.overlays.remove(conn_id);
        if *role == Role::Overlay {
            let _ = self.overlays.insert(conn_id.to_owned());
        }
    }

    /// Forget `conn_id`. Returns whether it was an overlay.
    pub fn remove(&mut self, conn_id: &str) -> bool {
        self.overlays.remove(conn_id)
    }

    /// Whether `conn_id` is an overlay.
    pub fn is_overlay(&self, conn_id: &str) -> bool {
        self.overlays.contains(conn_id)
    }

    /// Number of overlay connections.
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.overlays.clear();
    }
}
