//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the process-wide subscriber (stderr, compact or JSON)
//! - [`capture_logs`] installs a thread-local capture layer for test assertions
//!
//! `RUST_LOG` always wins over the configured level.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber on stderr.
///
/// Call once at startup. Later calls are no-ops.
///
/// # Arguments
///
/// * `level` - Default filter directive when `RUST_LOG` is unset (e.g. `"info"`).
/// * `json` - Emit one JSON object per line instead of the compact format.
pub fn init_subscriber(level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already installed
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_is_repeatable() {
        init_subscriber("warn", false);
        init_subscriber("debug", true);
    }
}
