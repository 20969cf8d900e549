//! Package-level constants.

/// Current version of Overcast (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "overcast";

/// Default port of the broadcast hub.
pub const DEFAULT_HUB_PORT: u16 = 49322;

/// Default port of the game telemetry source.
pub const DEFAULT_TELEMETRY_PORT: u16 = 49122;

/// Default port of the obs-websocket endpoint.
pub const DEFAULT_OBS_PORT: u16 = 4455;

/// Floor for configured fixed reconnect delays, in ms.
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;
