//! Telemetry client errors.

use thiserror::Error;

/// Why a frame could not be written to the telemetry source.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// No open connection. Nothing is queued.
    #[error("telemetry link is not open")]
    NotConnected,
    /// The connection went away between the open check and the write.
    #[error("telemetry link closed while sending")]
    Closed,
    /// WebSocket transport failure.
    #[error("telemetry transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
