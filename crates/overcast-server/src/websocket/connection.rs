//! Hub client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use overcast_core::Role;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of queueing a frame for one client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the outbound queue.
    Queued,
    /// Queue full. Carries the connection's total drop count.
    Dropped(u64),
    /// The write task has already gone away.
    Closed,
}

/// A connected hub client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    role: Mutex<Role>,
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a connection feeding `tx`. Cancelling `cancel` ends the session.
    pub fn new(id: String, tx: mpsc::Sender<Arc<str>>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id,
            role: Mutex::new(Role::Unknown),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            cancel,
        }
    }

    /// Current declared role.
    pub fn role(&self) -> Role {
        self.role.lock().clone()
    }

    /// Apply a role declaration.
    ///
    /// Returns `false` (and leaves the role alone) when the connection
    /// already holds a different declared role.
    pub fn try_declare(&self, role: &Role) -> bool {
        let mut current = self.role.lock();
        if current.is_declared() && *current != *role {
            return false;
        }
        current.clone_from(role);
        true
    }

    /// Queue a frame without waiting.
    pub fn send(&self, message: Arc<str>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                SendOutcome::Dropped(self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1)
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag. `true` if there was activity since the
    /// previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Ask the session to close this connection.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Whether [`disconnect`](Self::disconnect) (or hub shutdown) has fired.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
