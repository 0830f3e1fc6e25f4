//! talkback - Continuous speech recognition with spoken replies
//!
//! Chains bounded-duration recognition sessions into one unbounded
//! transcript stream while a shared duplex engine captures and plays audio.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod error;
pub mod permission;
pub mod recognition;
pub mod synthesis;

// Consumed traits (device, recognizer, voice, platform permissions)
pub use audio::backend::{AudioBackend, MockAudioBackend};
pub use permission::{PermissionProvider, StaticPermissions};
pub use recognition::recognizer::{MockRecognizer, RecognitionTask, Recognizer, SessionSink};
pub use synthesis::{MockSynthesizer, Synthesizer};

#[cfg(feature = "cpal-audio")]
pub use audio::cpal_backend::CpalBackend;

// Engine and controller
pub use audio::duplex::{DuplexEngine, SharedDuplexEngine};
pub use audio::frame::{AudioFrame, StreamFormat};
pub use controller::{
    ControllerState, ErrorReporter, EventStream, LogReporter, SessionError, StreamEvent,
    VoiceChatController,
};

// Error handling
pub use error::{PermissionKind, Result, TalkbackError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
