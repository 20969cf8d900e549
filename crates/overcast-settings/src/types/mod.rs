//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod automation;
mod hub;
mod telemetry;

pub use automation::*;
pub use hub::*;
pub use telemetry::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "hub": { "port": 49322 },
///   "automation": { "enabled": true, "liveScene": "Game" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OvercastSettings {
    /// Broadcast hub listener.
    pub hub: HubSettings,
    /// Game telemetry source.
    pub telemetry: TelemetrySettings,
    /// Streaming-control automation.
    pub automation: AutomationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
