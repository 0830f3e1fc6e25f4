//! Default configuration constants for talkback.
//!
//! Shared by the config types and the components that fall back to them
//! when constructed without a config file.

/// Samples per captured frame delivered by the duplex engine.
///
/// 1024 samples is ~21ms at 48kHz and ~64ms at 16kHz.
pub const BLOCK_SIZE: usize = 1024;

/// Delay after the most recent partial before the recognition session is rotated.
///
/// Recognizers stop producing partials when the speaker pauses; a quiet
/// session is closed and replaced before it reaches its own duration ceiling.
pub const ROTATION_DELAY_MS: u64 = 2000;

/// Default recognition locale.
pub const RECOGNITION_LOCALE: &str = "ja-JP";

/// Default synthesis voice language.
pub const VOICE_LANGUAGE: &str = "ja-JP";

/// Neutral speaking rate multiplier.
pub const SPEECH_RATE: f32 = 1.0;

/// Neutral pitch multiplier.
pub const SPEECH_PITCH: f32 = 1.0;

/// Full synthesis volume.
pub const SPEECH_VOLUME: f32 = 1.0;
