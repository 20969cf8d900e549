//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`OvercastSettings::default()`]
//! 2. If `~/.overcast/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `OVERCAST_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::OvercastSettings;

/// Resolve the path to the settings file (`~/.overcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".overcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<OvercastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<OvercastSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults with the file deep-merged over them, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<OvercastSettings> {
    let defaults = serde_json::to_value(OvercastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `OVERCAST_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut OvercastSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored, falling back to file/default.
pub fn apply_overrides_with(
    settings: &mut OvercastSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = Env { lookup };

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("OVERCAST_HUB_HOST") {
        settings.hub.host = v;
    }
    if let Some(v) = env.parsed("OVERCAST_HUB_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.hub.port = v;
    }
    if let Some(v) = env.parsed("OVERCAST_HUB_HEARTBEAT_SECS", |s| parse_u64_range(s, 1, 3600)) {
        settings.hub.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.parsed("OVERCAST_HUB_METRICS", parse_bool) {
        settings.hub.metrics_enabled = v;
    }

    // ── Telemetry ───────────────────────────────────────────────────
    if let Some(v) = env.string("OVERCAST_TELEMETRY_URL") {
        settings.telemetry.url = v;
    }
    if let Some(v) = env.parsed("OVERCAST_TELEMETRY_DEBUG", parse_bool) {
        settings.telemetry.debug = v;
    }
    if let Some(v) = env.string("OVERCAST_TELEMETRY_DEBUG_FILTER") {
        settings.telemetry.debug_filter = Some(v);
    }

    // ── Automation ──────────────────────────────────────────────────
    if let Some(v) = env.parsed("OVERCAST_AUTOMATION_ENABLED", parse_bool) {
        settings.automation.enabled = v;
    }
    if let Some(v) = env.parsed("OVERCAST_AUTOMATION_MODE", |s| {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }) {
        settings.automation.mode = v;
    }
    if let Some(v) = env.string("OVERCAST_OBS_URL") {
        settings.automation.obs.url = v;
    }
    if let Some(v) = env.string("OVERCAST_OBS_PASSWORD") {
        settings.automation.obs.password = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("OVERCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("OVERCAST_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
