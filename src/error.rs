//! Error types for talkback.

use std::fmt;
use thiserror::Error;

/// Which authorization was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    /// Microphone access.
    Capture,
    /// Speech recognition access.
    Recognition,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKind::Capture => write!(f, "Not permitted to record audio"),
            PermissionKind::Recognition => write!(f, "Not authorized to recognize speech"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TalkbackError {
    // Permission errors
    #[error("Permission denied: {kind}")]
    PermissionDenied { kind: PermissionKind },

    #[error("Permissions have not been granted; request them first")]
    NotAuthorized,

    // Lifecycle misuse
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Audio engine is already running")]
    AlreadyRunning,

    // Device session errors
    #[error("Audio session setup failed: {message}")]
    Setup { message: String },

    // Recognition errors
    #[error("Recognizer is unavailable")]
    RecognizerUnavailable,

    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    // Synthesis errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TalkbackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_denied_display() {
        let capture = TalkbackError::PermissionDenied {
            kind: PermissionKind::Capture,
        };
        assert_eq!(
            capture.to_string(),
            "Permission denied: Not permitted to record audio"
        );

        let recognition = TalkbackError::PermissionDenied {
            kind: PermissionKind::Recognition,
        };
        assert_eq!(
            recognition.to_string(),
            "Permission denied: Not authorized to recognize speech"
        );
    }

    #[test]
    fn test_already_recording_display() {
        assert_eq!(
            TalkbackError::AlreadyRecording.to_string(),
            "Already recording"
        );
    }

    #[test]
    fn test_setup_display() {
        let error = TalkbackError::Setup {
            message: "category rejected".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio session setup failed: category rejected"
        );
    }

    #[test]
    fn test_recognition_display() {
        let error = TalkbackError::Recognition {
            message: "network lost".to_string(),
        };
        assert_eq!(error.to_string(), "Recognition failed: network lost");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = TalkbackError::ConfigInvalidValue {
            key: "audio.block_size".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for audio.block_size: must be positive"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: TalkbackError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: TalkbackError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TalkbackError>();
        assert_sync::<TalkbackError>();
    }
}
