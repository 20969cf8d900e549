//! obs-websocket error types.

use thiserror::Error;

/// Errors from the obs-websocket client.
///
/// `Clone` so a single in-flight connect attempt can hand the same outcome
/// to every caller awaiting it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ObsError {
    /// The socket could not be opened or dropped during the handshake.
    #[error("obs connect failed: {0}")]
    Connect(String),

    /// The server closed with code 4009.
    #[error("obs authentication failed")]
    AuthFailed,

    /// The server sent something the handshake did not expect.
    #[error("obs protocol error: {0}")]
    Protocol(String),

    /// Connection intent was withdrawn while connecting or waiting to retry.
    #[error("obs connect cancelled")]
    Cancelled,

    /// No session is open.
    #[error("obs is not connected")]
    NotConnected,

    /// The session closed before the response arrived.
    #[error("obs connection closed")]
    Closed,

    /// No response within the request timeout.
    #[error("obs {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        /// Request that timed out.
        request_type: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The server answered with `requestStatus.result == false`.
    #[error("obs {request_type} failed ({code}): {}", comment.as_deref().unwrap_or("no comment"))]
    Request {
        /// Request that failed.
        request_type: String,
        /// obs-websocket `RequestStatus` code.
        code: u16,
        /// Human-readable reason, when the server gave one.
        comment: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_includes_comment() {
        let err = ObsError::Request {
            request_type: "SetCurrentProgramScene".into(),
            code: 600,
            comment: Some("No source was found by the name of `Missing`.".into()),
        };
        let text = err.to_string();
        assert!(text.contains("SetCurrentProgramScene"));
        assert!(text.contains("600"));
        assert!(text.contains("Missing"));
    }

    #[test]
    fn request_error_without_comment() {
        let err = ObsError::Request {
            request_type: "GetSceneList".into(),
            code: 205,
            comment: None,
        };
        assert!(err.to_string().ends_with("no comment"));
    }

    #[test]
    fn timeout_display() {
        let err = ObsError::Timeout {
            request_type: "GetSceneList".into(),
            timeout_ms: 10_000,
        };
        assert_eq!(err.to_string(), "obs GetSceneList timed out after 10000ms");
    }
}
