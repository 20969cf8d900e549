//! # overcast-settings
//!
//! Layered configuration for Overcast.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`OvercastSettings::default()`]
//! 2. **User file**: `~/.overcast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `OVERCAST_*` overrides (highest priority)
//!
//! [`SettingsWatcher`] republishes the file whenever it changes so the
//! automation relay can be restarted with a fresh snapshot.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;
pub mod watcher;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
pub use watcher::SettingsWatcher;
