use crate::config::AudioConfig;
use crate::error::{Result, TalkbackError};
use std::sync::{Arc, Mutex, MutexGuard};

/// Input tap callback: receives mono samples in whatever block size the device uses.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Trait for the device-level duplex audio graph.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// A backend owns one device session with an input tap and an output player
/// connected to the same mixer, so voice processing on the input can see
/// what is being played.
pub trait AudioBackend: Send {
    /// Configure the device session for simultaneous capture and playback
    /// and attach the playback node. No tap is installed.
    ///
    /// # Returns
    /// The input sample rate, which the output path also uses.
    fn configure(&mut self, config: &AudioConfig) -> Result<u32>;

    /// Install the input tap and start the graph.
    fn start(&mut self, on_input: InputCallback) -> Result<()>;

    /// Remove the input tap and halt the graph.
    fn stop(&mut self);

    /// Schedule mono samples on the output player.
    fn schedule(&mut self, samples: &[f32]);

    /// Release the device session, notifying other audio on the system.
    fn deactivate(&mut self) -> Result<()>;

    /// Name of the backend for logging.
    fn name(&self) -> &str;
}

#[derive(Default)]
struct MockState {
    configured: Option<AudioConfig>,
    tap: Option<InputCallback>,
    played: Vec<f32>,
    schedule_calls: usize,
    configure_calls: usize,
    deactivate_calls: usize,
}

/// Mock duplex backend for testing.
///
/// Clones share state, so a test can keep one clone to push input
/// and inspect playback while the engine owns another.
#[derive(Clone)]
pub struct MockAudioBackend {
    state: Arc<Mutex<MockState>>,
    sample_rate: u32,
    should_fail_configure: bool,
    should_fail_start: bool,
    should_fail_deactivate: bool,
}

impl MockAudioBackend {
    /// Create a new mock backend reporting 16kHz input
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            sample_rate: 16000,
            should_fail_configure: false,
            should_fail_start: false,
            should_fail_deactivate: false,
        }
    }

    /// Configure the sample rate reported by `configure`
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Configure the mock to fail session setup
    pub fn with_configure_failure(mut self) -> Self {
        self.should_fail_configure = true;
        self
    }

    /// Configure the mock to fail starting the graph
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail session deactivation
    pub fn with_deactivate_failure(mut self) -> Self {
        self.should_fail_deactivate = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a block of input samples through the installed tap.
    ///
    /// Returns false when no tap is installed (the block is discarded).
    pub fn push_input(&self, samples: &[f32]) -> bool {
        let mut state = self.lock();
        match state.tap.as_mut() {
            Some(tap) => {
                tap(samples);
                true
            }
            None => false,
        }
    }

    /// All samples scheduled for playback so far.
    pub fn played(&self) -> Vec<f32> {
        self.lock().played.clone()
    }

    pub fn schedule_calls(&self) -> usize {
        self.lock().schedule_calls
    }

    pub fn is_tapped(&self) -> bool {
        self.lock().tap.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.lock().configured.is_some()
    }

    /// Session options passed to the last successful `configure`.
    pub fn last_config(&self) -> Option<AudioConfig> {
        self.lock().configured.clone()
    }

    pub fn configure_calls(&self) -> usize {
        self.lock().configure_calls
    }

    pub fn deactivate_calls(&self) -> usize {
        self.lock().deactivate_calls
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockAudioBackend {
    fn configure(&mut self, config: &AudioConfig) -> Result<u32> {
        let mut state = self.lock();
        state.configure_calls += 1;
        if self.should_fail_configure {
            return Err(TalkbackError::Setup {
                message: "mock session rejected play-and-record".to_string(),
            });
        }
        state.configured = Some(config.clone());
        Ok(self.sample_rate)
    }

    fn start(&mut self, on_input: InputCallback) -> Result<()> {
        if self.should_fail_start {
            return Err(TalkbackError::Setup {
                message: "mock graph failed to start".to_string(),
            });
        }
        self.lock().tap = Some(on_input);
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().tap = None;
    }

    fn schedule(&mut self, samples: &[f32]) {
        let mut state = self.lock();
        state.schedule_calls += 1;
        state.played.extend_from_slice(samples);
    }

    fn deactivate(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.deactivate_calls += 1;
        if self.should_fail_deactivate {
            return Err(TalkbackError::Setup {
                message: "mock session could not be deactivated".to_string(),
            });
        }
        state.configured = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
