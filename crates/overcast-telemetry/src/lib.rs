//! # overcast-telemetry
//!
//! Pub/sub client for the game telemetry feed.
//!
//! One [`TelemetryClient`] per logical link. Subscriptions are keyed by
//! `channel:event` pairs; each new network pair is registered upstream with a
//! `wsRelay:register` frame, and every known pair is registered again after a
//! reconnect. The reserved `local` channel never touches the network and
//! `ws:status` carries the client's own link status.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;

pub use client::{StatusReport, TelemetryClient};
pub use config::TelemetryConfig;
pub use dispatch::{LOCAL_CHANNEL, Names, STATUS_CHANNEL, STATUS_EVENT};
pub use error::TelemetryError;
