//! Trigger policy: game event + mode → scene switch.

use std::fmt;

use overcast_settings::{AutomationSettings, TriggerMode};

/// Telemetry channel carrying match lifecycle events.
pub const GAME_CHANNEL: &str = "game";

/// A game event the relay reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// `game:pre_countdown_begin`
    MatchStart,
    /// `game:match_ended`
    MatchEnd,
}

impl Trigger {
    /// Every trigger, in subscription order.
    pub const ALL: [Self; 2] = [Self::MatchStart, Self::MatchEnd];

    /// Telemetry channel.
    pub fn channel(self) -> &'static str {
        match self {
            Self::MatchStart | Self::MatchEnd => GAME_CHANNEL,
        }
    }

    /// Telemetry event name.
    pub fn event(self) -> &'static str {
        match self {
            Self::MatchStart => "pre_countdown_begin",
            Self::MatchEnd => "match_ended",
        }
    }

    /// Whether `mode` lets this trigger through.
    pub fn enabled_in(self, mode: TriggerMode) -> bool {
        match self {
            Self::MatchStart => mode != TriggerMode::EndgameOnly,
            Self::MatchEnd => mode != TriggerMode::MatchStartOnly,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel(), self.event())
    }
}

/// Requests to issue for one trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneSwitch {
    /// Program scene to show.
    pub scene: String,
    /// Transition to select first; `None` keeps the current one.
    pub transition: Option<String>,
}

/// The switch `trigger` calls for, or `None` when the mode filters it out or
/// no scene is configured for it.
pub fn plan(trigger: Trigger, settings: &AutomationSettings) -> Option<SceneSwitch> {
    if !trigger.enabled_in(settings.mode) {
        return None;
    }
    let (scene, transition) = match trigger {
        Trigger::MatchStart => (&settings.live_scene, &settings.live_transition),
        Trigger::MatchEnd => (&settings.endgame_scene, &settings.endgame_transition),
    };
    let scene = scene.trim();
    if scene.is_empty() {
        return None;
    }
    let transition = transition.trim();
    Some(SceneSwitch {
        scene: scene.to_owned(),
        transition: (!transition.is_empty()).then(|| transition.to_owned()),
    })
}
