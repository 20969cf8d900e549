//! # overcast-automation
//!
//! Drives the streaming tool from game events.
//!
//! - [`obs`]: obs-websocket 5.x client with single-flight connect, jittered
//!   backoff and an explicit connection intent
//! - [`triggers`]: which game event maps to which scene switch
//! - [`hub_link`]: reconnecting hub client used to publish relay health
//! - [`relay`]: one running automation instance built from a settings snapshot
//! - [`supervisor`]: restarts the relay whenever its settings change

#![deny(unsafe_code)]

pub mod hub_link;
pub mod metrics;
pub mod obs;
pub mod relay;
pub mod supervisor;
pub mod triggers;

pub use hub_link::HubLink;
pub use obs::{ObsClient, ObsConfig, ObsError, ObsState};
pub use relay::{AutomationRelay, RelayEndpoints};
pub use supervisor::RelaySupervisor;
pub use triggers::{SceneSwitch, Trigger};
