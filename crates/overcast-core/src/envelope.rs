//! Wire envelopes for the hub and telemetry dialects.
//!
//! Hub frames carry a free-form `type` discriminator and are decoded once at
//! the boundary into [`HubInbound`]. Telemetry frames carry an
//! `event: "channel:event_name"` string and an arbitrary `data` payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::role::Role;
use crate::status::LinkStatus;

/// Hub `type` of a role declaration.
pub const HELLO_TYPE: &str = "hello";
/// Hub `type` of the overlay count broadcast.
pub const OVERLAY_STATUS_TYPE: &str = "overlayStatus";
/// Hub `type` of the automation relay's health message.
pub const AUTOMATION_STATUS_TYPE: &str = "obsAutomation:status";
/// Telemetry event used to register interest in a `channel:event` pair.
pub const REGISTER_EVENT: &str = "wsRelay:register";

// ─────────────────────────────────────────────────────────────────────────────
// Hub dialect
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound hub frame after boundary decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HubInbound {
    /// `{"type":"hello","role":<string>}`. Consumed by the hub, never relayed.
    Hello {
        /// Declared role.
        role: Role,
    },
    /// Anything else, including malformed JSON. Relayed verbatim.
    Relay,
}

impl HubInbound {
    /// Classify a raw text frame.
    pub fn decode(text: &str) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
            return Self::Relay;
        };
        match (map.get("type"), map.get("role")) {
            (Some(Value::String(t)), Some(Value::String(role))) if t == HELLO_TYPE => Self::Hello {
                role: Role::parse(role),
            },
            _ => Self::Relay,
        }
    }
}

/// `{"type":"hello","role":...}`
pub fn hello_message(role: &Role) -> String {
    json!({ "type": HELLO_TYPE, "role": role.as_str() }).to_string()
}

/// `{"type":"overlayStatus","overlays":N}`
pub fn overlay_status_message(overlays: usize) -> String {
    json!({ "type": OVERLAY_STATUS_TYPE, "overlays": overlays }).to_string()
}

/// `{"type":"obsAutomation:status","data":{"status":...,"commandFailures":n}}`
pub fn automation_status_message(status: LinkStatus, command_failures: u64) -> String {
    json!({
        "type": AUTOMATION_STATUS_TYPE,
        "data": { "status": status.as_str(), "commandFailures": command_failures },
    })
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry dialect
// ─────────────────────────────────────────────────────────────────────────────

/// `{"event":"channel:event_name","data":any}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    /// Qualified `channel:event_name`.
    pub event: String,
    /// Arbitrary payload. Absent on the wire decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

impl TelemetryEnvelope {
    /// Build an envelope for `channel:event`.
    pub fn new(channel: &str, event: &str, data: Value) -> Self {
        Self {
            event: format!("{channel}:{event}"),
            data,
        }
    }

    /// Decode an inbound frame. Frames that are not objects with a string
    /// `event` yield `None`.
    pub fn decode(text: &str) -> Option<Self> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(text).ok()? else {
            return None;
        };
        let Value::String(event) = map.remove("event")? else {
            return None;
        };
        let data = map.remove("data").unwrap_or(Value::Null);
        Some(Self { event, data })
    }

    /// Split at the first `:`. An event without a separator is all channel.
    pub fn split_event(&self) -> (&str, &str) {
        self.event.split_once(':').unwrap_or((self.event.as_str(), ""))
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> String {
        json!({ "event": self.event, "data": self.data }).to_string()
    }
}

/// `{"event":"wsRelay:register","data":"channel:event"}`
pub fn registration_message(channel: &str, event: &str) -> String {
    json!({ "event": REGISTER_EVENT, "data": format!("{channel}:{event}") }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_hello() {
        let msg = HubInbound::decode(r#"{"type":"hello","role":"overlay"}"#);
        assert_eq!(msg, HubInbound::Hello { role: Role::Overlay });
    }

    #[test]
    fn decode_hello_with_unknown_role_keeps_label() {
        let msg = HubInbound::decode(r#"{"type":"hello","role":"automation"}"#);
        assert_eq!(
            msg,
            HubInbound::Hello {
                role: Role::Other("automation".into())
            }
        );
    }

    #[test]
    fn hello_without_string_role_is_relayed() {
        assert_eq!(HubInbound::decode(r#"{"type":"hello"}"#), HubInbound::Relay);
        assert_eq!(HubInbound::decode(r#"{"type":"hello","role":3}"#), HubInbound::Relay);
    }

    #[test]
    fn malformed_and_other_types_are_relayed() {
        assert_eq!(HubInbound::decode("not json {"), HubInbound::Relay);
        assert_eq!(HubInbound::decode("[1,2]"), HubInbound::Relay);
        assert_eq!(HubInbound::decode(r#"{"type":"score","data":{}}"#), HubInbound::Relay);
    }

    #[test]
    fn overlay_status_shape() {
        let v: Value = serde_json::from_str(&overlay_status_message(2)).unwrap();
        assert_eq!(v, json!({"type": "overlayStatus", "overlays": 2}));
    }

    #[test]
    fn automation_status_shape() {
        let v: Value =
            serde_json::from_str(&automation_status_message(LinkStatus::Connecting, 3)).unwrap();
        assert_eq!(
            v,
            json!({"type": "obsAutomation:status", "data": {"status": "connecting", "commandFailures": 3}})
        );
    }

    #[test]
    fn hello_message_round_trips_through_decode() {
        let text = hello_message(&Role::Control);
        assert_eq!(HubInbound::decode(&text), HubInbound::Hello { role: Role::Control });
    }

    #[test]
    fn telemetry_decode_requires_string_event() {
        assert!(TelemetryEnvelope::decode(r#"{"data":1}"#).is_none());
        assert!(TelemetryEnvelope::decode(r#"{"event":5,"data":1}"#).is_none());
        assert!(TelemetryEnvelope::decode("garbage").is_none());
        let env = TelemetryEnvelope::decode(r#"{"event":"game:update_state"}"#).unwrap();
        assert_eq!(env.data, Value::Null);
    }

    #[test]
    fn split_at_first_colon_only() {
        let env = TelemetryEnvelope::new("game", "goal:scored", json!(null));
        assert_eq!(env.split_event(), ("game", "goal:scored"));
        let bare = TelemetryEnvelope {
            event: "heartbeat".into(),
            data: Value::Null,
        };
        assert_eq!(bare.split_event(), ("heartbeat", ""));
    }

    #[test]
    fn registration_shape() {
        let v: Value = serde_json::from_str(&registration_message("game", "match_ended")).unwrap();
        assert_eq!(v, json!({"event": "wsRelay:register", "data": "game:match_ended"}));
    }

    #[test]
    fn encode_shape() {
        let env = TelemetryEnvelope::new("sos", "version", json!({"v": 1}));
        let v: Value = serde_json::from_str(&env.encode()).unwrap();
        assert_eq!(v, json!({"event": "sos:version", "data": {"v": 1}}));
    }
}
