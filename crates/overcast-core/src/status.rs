//! Connection health tri-state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Health of a single link (hub, telemetry, or streaming-control).
///
/// This is the only failure signal that reaches the UI layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Not connected and not trying.
    #[default]
    Down,
    /// A connection attempt or reconnect delay is in progress.
    Connecting,
    /// Connected.
    Up,
}

impl LinkStatus {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Connecting => "connecting",
            Self::Up => "up",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_down() {
        assert_eq!(LinkStatus::default(), LinkStatus::Down);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LinkStatus::Connecting).unwrap(), "\"connecting\"");
        assert_eq!(serde_json::to_string(&LinkStatus::Up).unwrap(), "\"up\"");
    }

    #[test]
    fn display_matches_wire() {
        for status in [LinkStatus::Down, LinkStatus::Connecting, LinkStatus::Up] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.to_string());
        }
    }
}
