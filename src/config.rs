use crate::defaults;
use crate::error::{Result, TalkbackError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
}

/// Device session and duplex graph configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per captured frame.
    pub block_size: usize,
    /// Echo cancellation / voice processing on the input path.
    pub voice_processing: bool,
    /// Lower other applications' audio while the session is active.
    pub duck_others: bool,
    pub ducking_level: DuckingLevel,
    pub advanced_ducking: bool,
    /// Route playback to the built-in speaker instead of the receiver.
    pub default_to_speaker: bool,
    /// Allow bluetooth headsets (A2DP and HFP).
    pub allow_bluetooth: bool,
}

/// How strongly competing audio is ducked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuckingLevel {
    #[default]
    Min,
    Mid,
    Max,
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub locale: String,
    pub partial_results: bool,
    pub rotation_delay_ms: u64,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub pre_delay_ms: u32,
    pub post_delay_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: defaults::BLOCK_SIZE,
            voice_processing: true,
            duck_others: true,
            ducking_level: DuckingLevel::Min,
            advanced_ducking: false,
            default_to_speaker: true,
            allow_bluetooth: true,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            locale: defaults::RECOGNITION_LOCALE.to_string(),
            partial_results: true,
            rotation_delay_ms: defaults::ROTATION_DELAY_MS,
        }
    }
}

impl RecognitionConfig {
    pub fn rotation_delay(&self) -> Duration {
        Duration::from_millis(self.rotation_delay_ms)
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            language: defaults::VOICE_LANGUAGE.to_string(),
            rate: defaults::SPEECH_RATE,
            pitch: defaults::SPEECH_PITCH,
            volume: defaults::SPEECH_VOLUME,
            pre_delay_ms: 0,
            post_delay_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(&contents)?)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TALKBACK_LOCALE → recognition.locale
    /// - TALKBACK_VOICE → synthesis.language
    /// - TALKBACK_ROTATION_DELAY_MS → recognition.rotation_delay_ms
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(locale) = std::env::var("TALKBACK_LOCALE")
            && !locale.is_empty()
        {
            self.recognition.locale = locale;
        }

        if let Ok(voice) = std::env::var("TALKBACK_VOICE")
            && !voice.is_empty()
        {
            self.synthesis.language = voice;
        }

        if let Ok(delay) = std::env::var("TALKBACK_ROTATION_DELAY_MS")
            && let Ok(ms) = delay.parse::<u64>()
        {
            self.recognition.rotation_delay_ms = ms;
        }

        self
    }

    /// Check values that would leave the engine or controller unusable.
    pub fn validate(&self) -> Result<()> {
        if self.audio.block_size == 0 {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "audio.block_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.recognition.rotation_delay_ms == 0 {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "recognition.rotation_delay_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.recognition.locale.trim().is_empty() {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "recognition.locale".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.synthesis.volume) {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "synthesis.volume".to_string(),
                message: format!("{} is outside 0.0..=1.0", self.synthesis.volume),
            });
        }
        if self.synthesis.rate <= 0.0 || self.synthesis.pitch <= 0.0 {
            return Err(TalkbackError::ConfigInvalidValue {
                key: "synthesis".to_string(),
                message: "rate and pitch must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/talkback/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("talkback").join("config.toml"))
    }
}
