//! Classification and reporting of recognition session failures.

use std::fmt;
use tracing::{error, warn};

/// A failure raised by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Absorbed by rotating to a fresh session; the stream stays alive.
    Recoverable(String),
    /// Ends the event stream with an error.
    Fatal(String),
}

impl SessionError {
    pub fn message(&self) -> &str {
        match self {
            SessionError::Recoverable(msg) | SessionError::Fatal(msg) => msg,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            SessionError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Trait for reporting session errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from the session with the given sequence number.
    fn report(&self, session: u64, error: &SessionError);
}

/// Default reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, session: u64, error: &SessionError) {
        match error {
            SessionError::Recoverable(msg) => {
                warn!(session, "recognition session failed, rotating: {}", msg)
            }
            SessionError::Fatal(msg) => error!(session, "recognition stopped: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let recoverable = SessionError::Recoverable("network hiccup".to_string());
        assert_eq!(recoverable.to_string(), "Recoverable error: network hiccup");
        assert!(!recoverable.is_fatal());

        let fatal = SessionError::Fatal("recognizer gone".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: recognizer gone");
        assert!(fatal.is_fatal());
        assert_eq!(fatal.message(), "recognizer gone");
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        // Just ensure it doesn't panic
        reporter.report(3, &SessionError::Recoverable("test error".to_string()));
        reporter.report(3, &SessionError::Fatal("test error".to_string()));
    }
}
