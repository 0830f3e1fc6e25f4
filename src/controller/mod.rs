//! Continuous recognition over chained, bounded-duration sessions.

pub mod error;
pub mod stream;
pub mod voice_chat;
pub mod worker;

pub use error::{ErrorReporter, LogReporter, SessionError};
pub use stream::{EventPublisher, EventStream, StreamEvent};
pub use voice_chat::{ControllerState, VoiceChatController};
pub use worker::RecordingSummary;
