//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or watching settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Failed to install the settings file watcher.
    #[error("failed to watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn io_error_display() {
        let err = SettingsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: SettingsError = json_err.into();
        assert_matches!(err, SettingsError::Json(_));
        assert!(err.to_string().contains("parse settings JSON"));
    }

    #[test]
    fn watch_error_from_conversion() {
        let err: SettingsError = notify::Error::generic("boom").into();
        assert_matches!(err, SettingsError::Watch(_));
    }
}
