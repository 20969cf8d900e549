//! # overcast-server
//!
//! The broadcast hub every UI surface connects to.
//!
//! - **Relay**: any frame that is not a role declaration is sent verbatim to
//!   every open connection, the sender included
//! - **Roles**: `{"type":"hello","role":...}` updates the overlay registry and
//!   triggers an `overlayStatus` broadcast; it is never relayed
//! - **Heartbeat**: server Pings; silent clients are dropped
//! - **Backpressure**: bounded per-client queues, drop-then-disconnect
//! - **Endpoints**: WebSocket on `/` and `/ws`, `GET /health`, `GET /metrics`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::HubConfig;
pub use error::HubError;
pub use server::HubServer;
