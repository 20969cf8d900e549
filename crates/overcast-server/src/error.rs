//! Hub error types.

use thiserror::Error;

/// Errors surfaced by [`HubServer`](crate::server::HubServer).
#[derive(Debug, Error)]
pub enum HubError {
    /// The listen address could not be bound (usually already in use).
    #[error("failed to bind hub listener on {addr}: {source}")]
    Bind {
        /// Requested `host:port`.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// `listen` was called on a hub that is already serving.
    #[error("hub is already listening")]
    AlreadyListening,
    /// `listen` was called after `stop`.
    #[error("hub has been stopped")]
    Stopped,
    /// Other I/O failure.
    #[error("hub I/O error: {0}")]
    Io(#[from] std::io::Error),
}
