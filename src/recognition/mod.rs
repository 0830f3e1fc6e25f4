//! Bounded-duration speech recognition sessions.

pub mod recognizer;
pub mod session;

pub use recognizer::{
    MockRecognizer, RecognitionTask, Recognizer, SessionEvent, SessionMessage, SessionSink,
};
pub use session::{RecognitionSession, SessionState};
