//! Hub client roles.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The label a hub client declares about itself in its `hello` message.
///
/// The set is open: anything that is not one of the known surfaces is kept
/// verbatim in [`Role::Other`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    /// No role declared yet.
    #[default]
    Unknown,
    /// Operator control panel.
    Control,
    /// In-game overlay scene. Counted by the hub.
    Overlay,
    /// Post-match endgame scene.
    Endgame,
    /// Any other declared label.
    Other(String),
}

impl Role {
    /// Parse a declared role string. Matching is exact and case-sensitive.
    pub fn parse(value: &str) -> Self {
        match value {
            "unknown" => Self::Unknown,
            "control" => Self::Control,
            "overlay" => Self::Overlay,
            "endgame" => Self::Endgame,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "unknown",
            Self::Control => "control",
            Self::Overlay => "overlay",
            Self::Endgame => "endgame",
            Self::Other(s) => s,
        }
    }

    /// Whether this role has been declared.
    pub fn is_declared(&self) -> bool {
        *self != Self::Unknown
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
