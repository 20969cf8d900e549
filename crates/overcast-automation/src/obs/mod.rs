//! obs-websocket 5.x client.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{ObsClient, ObsConfig, ObsState};
pub use error::ObsError;
