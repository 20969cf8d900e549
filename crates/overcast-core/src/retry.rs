//! Reconnect backoff math.
//!
//! - [`BackoffConfig`]: base/max delay and jitter for a reconnect loop
//! - [`backoff_delay_with_random`]: exponential backoff with explicit randomness
//! - [`BackoffConfig::delay`]: the same, seeded from the thread RNG

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0 to 1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Exponential backoff parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Delay before the first retry, in ms.
    pub base_delay_ms: u64,
    /// Upper bound on the un-jittered delay, in ms.
    pub max_delay_ms: u64,
    /// Symmetric jitter range (0.2 means ±20%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            rand::random::<f64>(),
        );
        Duration::from_millis(ms)
    }
}

/// Exponential backoff with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * jitter)`.
/// `random` should be in `[0.0, 1.0)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}
