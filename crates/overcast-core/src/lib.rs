//! # overcast-core
//!
//! Shared vocabulary for the Overcast relay crates:
//!
//! - **Envelopes**: hub (`type`-tagged) and telemetry (`event`-tagged) wire shapes
//! - **Roles**: the label a hub client declares about itself
//! - **Link status**: the `down | connecting | up` tri-state surfaced to UIs
//! - **Backoff**: exponential delay with jitter for reconnect loops
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod logging;
pub mod retry;
pub mod role;
pub mod status;

pub use envelope::{HubInbound, TelemetryEnvelope};
pub use role::Role;
pub use status::LinkStatus;
