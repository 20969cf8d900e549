//! Streaming-control automation settings.

use std::time::Duration;

use overcast_core::constants::{DEFAULT_OBS_PORT, MIN_RECONNECT_DELAY_MS};
use overcast_core::retry::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Which game events drive scene switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerMode {
    /// Switch on match start and match end.
    #[default]
    Both,
    /// Switch only when a match is about to start.
    MatchStartOnly,
    /// Switch only when a match ends.
    EndgameOnly,
}

/// obs-websocket endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObsSettings {
    /// WebSocket URL of obs-websocket.
    pub url: String,
    /// Server password. `None` when authentication is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Reconnect backoff after a failed handshake.
    pub backoff: BackoffConfig,
    /// Per-request acknowledgement timeout, in ms.
    pub request_timeout_ms: u64,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{DEFAULT_OBS_PORT}"),
            password: None,
            backoff: BackoffConfig::default(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Automation relay snapshot. A running relay never sees changes to this;
/// it is replaced instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationSettings {
    /// Run the relay at all.
    pub enabled: bool,
    /// Trigger filter.
    pub mode: TriggerMode,
    /// Streaming-control endpoint.
    pub obs: ObsSettings,
    /// Scene shown while a match is live. Empty disables the switch.
    pub live_scene: String,
    /// Transition into the live scene. Empty keeps the current transition.
    pub live_transition: String,
    /// Scene shown after a match. Empty disables the switch.
    pub endgame_scene: String,
    /// Transition into the endgame scene. Empty keeps the current transition.
    pub endgame_transition: String,
    /// Fixed delay between hub link reconnects, in ms.
    pub hub_reconnect_delay_ms: u64,
}

impl AutomationSettings {
    /// Hub link reconnect delay, never below [`MIN_RECONNECT_DELAY_MS`].
    pub fn hub_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.hub_reconnect_delay_ms.max(MIN_RECONNECT_DELAY_MS))
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TriggerMode::Both,
            obs: ObsSettings::default(),
            live_scene: String::new(),
            live_transition: String::new(),
            endgame_scene: String::new(),
            endgame_transition: String::new(),
            hub_reconnect_delay_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hub_reconnect_delay_is_floored() {
        let settings: AutomationSettings =
            serde_json::from_str(r#"{"hubReconnectDelayMs": 0}"#).unwrap();
        assert_eq!(settings.hub_reconnect_delay(), Duration::from_millis(MIN_RECONNECT_DELAY_MS));
        assert_eq!(AutomationSettings::default().hub_reconnect_delay(), Duration::from_secs(2));
    }

    #[test]
    fn trigger_mode_wire_names() {
        assert_eq!(serde_json::to_value(TriggerMode::Both).unwrap(), "both");
        assert_eq!(
            serde_json::to_value(TriggerMode::MatchStartOnly).unwrap(),
            "matchStartOnly"
        );
        let mode: TriggerMode = serde_json::from_str("\"endgameOnly\"").unwrap();
        assert_eq!(mode, TriggerMode::EndgameOnly);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(serde_json::from_str::<TriggerMode>("\"sometimes\"").is_err());
    }

    #[test]
    fn partial_obs_block_keeps_defaults() {
        let settings: AutomationSettings =
            serde_json::from_str(r#"{"obs": {"password": "hunter2"}}"#).unwrap();
        assert_eq!(settings.obs.password.as_deref(), Some("hunter2"));
        assert_eq!(settings.obs.url, "ws://127.0.0.1:4455");
        assert_eq!(settings.obs.request_timeout_ms, 10_000);
        assert!(!settings.enabled);
    }

    #[test]
    fn password_omitted_when_none() {
        let v = serde_json::to_value(ObsSettings::default()).unwrap();
        assert!(v.get("password").is_none());
    }
}
