//! Shared capture + playback engine.
//!
//! One engine owns one backend graph. Capture and playback go through the
//! same device session so the input's voice processing knows about the
//! audio being played, which is what keeps synthesized speech out of the
//! transcript.

use crate::audio::backend::AudioBackend;
use crate::audio::frame::{AudioFrame, FrameAssembler, StreamFormat};
use crate::config::AudioConfig;
use crate::error::{Result, TalkbackError};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Engine handle shared by the controller and the synthesis adapter.
pub type SharedDuplexEngine = Arc<Mutex<DuplexEngine>>;

/// Lifecycle of the device graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No device session configured.
    Unconfigured,
    /// Session configured and playback node attached, graph not running.
    Prewarmed,
    /// Graph running with the input tap installed.
    Running,
}

pub struct DuplexEngine {
    backend: Box<dyn AudioBackend>,
    config: AudioConfig,
    state: EngineState,
    format: Option<StreamFormat>,
}

impl DuplexEngine {
    pub fn new(backend: Box<dyn AudioBackend>, config: AudioConfig) -> Self {
        Self {
            backend,
            config,
            state: EngineState::Unconfigured,
            format: None,
        }
    }

    /// Wraps the engine for sharing between components.
    pub fn into_shared(self) -> SharedDuplexEngine {
        Arc::new(Mutex::new(self))
    }

    /// Configure the device session and attach the playback node.
    ///
    /// Idempotent once prewarmed. A failure leaves the engine unconfigured
    /// and is reported as `TalkbackError::Setup`.
    pub fn prewarm(&mut self) -> Result<StreamFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }

        let sample_rate = self.backend.configure(&self.config).map_err(|e| match e {
            TalkbackError::Setup { .. } => e,
            other => TalkbackError::Setup {
                message: other.to_string(),
            },
        })?;

        let format = StreamFormat {
            sample_rate,
            block_size: self.config.block_size.max(1),
        };
        self.format = Some(format);
        self.state = EngineState::Prewarmed;

        info!(
            backend = self.backend.name(),
            sample_rate,
            block_size = format.block_size,
            "duplex engine prewarmed"
        );
        Ok(format)
    }

    /// Install the input tap and start delivering fixed-size frames to `sink`.
    ///
    /// Prewarms first if needed. Restarting requires `stop_capture` first.
    pub fn start_capture<T>(&mut self, sink: Sender<T>) -> Result<StreamFormat>
    where
        T: From<AudioFrame> + Send + 'static,
    {
        if self.state == EngineState::Running {
            return Err(TalkbackError::AlreadyRunning);
        }

        let format = self.prewarm()?;
        let mut assembler = FrameAssembler::new(format.block_size);

        self.backend.start(Box::new(move |samples: &[f32]| {
            for frame in assembler.push(samples) {
                // Receiver gone means recording is being torn down.
                if sink.send(T::from(frame)).is_err() {
                    break;
                }
            }
        }))?;

        self.state = EngineState::Running;
        debug!(backend = self.backend.name(), "capture started");
        Ok(format)
    }

    /// Remove the tap, drop the frame sink and halt the graph. No-op when idle.
    pub fn stop_capture(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.backend.stop();
        self.state = EngineState::Prewarmed;
        debug!(backend = self.backend.name(), "capture stopped");
    }

    /// Schedule samples on the shared output path.
    ///
    /// Returns false when the engine is not running; the samples are dropped.
    pub fn play(&mut self, samples: &[f32]) -> bool {
        if self.state != EngineState::Running {
            debug!(samples = samples.len(), "engine not running, dropping playback");
            return false;
        }
        self.backend.schedule(samples);
        true
    }

    /// Release the device session. The next capture prewarms again.
    pub fn deactivate(&mut self) -> Result<()> {
        self.stop_capture();
        if self.state == EngineState::Unconfigured {
            return Ok(());
        }

        self.state = EngineState::Unconfigured;
        self.format = None;
        self.backend.deactivate().inspect_err(|e| {
            warn!(backend = self.backend.name(), error = %e, "session deactivation failed");
        })
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::MockAudioBackend;
    use crossbeam_channel::unbounded;

    fn engine_with(backend: &MockAudioBackend, block_size: usize) -> DuplexEngine {
        let config = AudioConfig {
            block_size,
            ..Default::default()
        };
        DuplexEngine::new(Box::new(backend.clone()), config)
    }

    #[test]
    fn test_prewarm_is_idempotent() {
        let backend = MockAudioBackend::new().with_sample_rate(48000);
        let mut engine = engine_with(&backend, 1024);

        let first = engine.prewarm().unwrap();
        let second = engine.prewarm().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.sample_rate, 48000);
        assert_eq!(backend.configure_calls(), 1);
        assert_eq!(engine.state(), EngineState::Prewarmed);
        assert!(!backend.is_tapped(), "prewarm must not install a tap");
    }

    #[test]
    fn test_prewarm_failure_is_setup_error() {
        let backend = MockAudioBackend::new().with_configure_failure();
        let mut engine = engine_with(&backend, 1024);

        assert!(matches!(engine.prewarm(), Err(TalkbackError::Setup { .. })));
        assert_eq!(engine.state(), EngineState::Unconfigured);
        assert!(engine.format().is_none());
    }

    #[test]
    fn test_start_capture_delivers_fixed_blocks() {
        let backend = MockAudioBackend::new();
        let mut engine = engine_with(&backend, 4);
        let (tx, rx) = unbounded::<AudioFrame>();

        engine.start_capture(tx).unwrap();
        assert!(engine.is_running());

        backend.push_input(&[0.1, 0.2, 0.3]);
        assert!(rx.try_recv().is_err());
        backend.push_input(&[0.4, 0.5]);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frame.sequence, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_start_capture_twice_is_already_running() {
        let backend = MockAudioBackend::new();
        let mut engine = engine_with(&backend, 4);
        let (tx, _rx) = unbounded::<AudioFrame>();

        engine.start_capture(tx.clone()).unwrap();
        assert!(matches!(
            engine.start_capture(tx),
            Err(TalkbackError::AlreadyRunning)
        ));
        assert!(engine.is_running());
    }

    #[test]
    fn test_start_failure_leaves_engine_prewarmed() {
        let backend = MockAudioBackend::new().with_start_failure();
        let mut engine = engine_with(&backend, 4);
        let (tx, _rx) = unbounded::<AudioFrame>();

        assert!(engine.start_capture(tx).is_err());
        assert_eq!(engine.state(), EngineState::Prewarmed);
    }

    #[test]
    fn test_stop_capture_is_safe_when_idle() {
        let backend = MockAudioBackend::new();
        let mut engine = engine_with(&backend, 4);

        engine.stop_capture();
        assert_eq!(engine.state(), EngineState::Unconfigured);

        let (tx, rx) = unbounded::<AudioFrame>();
        engine.start_capture(tx).unwrap();
        engine.stop_capture();
        engine.stop_capture();

        assert!(!backend.is_tapped());
        assert!(!backend.push_input(&[0.0; 8]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_play_requires_running_engine() {
        let backend = MockAudioBackend::new();
        let mut engine = engine_with(&backend, 4);

        assert!(!engine.play(&[0.5; 4]));
        assert!(backend.played().is_empty());

        let (tx, _rx) = unbounded::<AudioFrame>();
        engine.start_capture(tx).unwrap();
        assert!(engine.play(&[0.5; 4]));
        assert_eq!(backend.played(), vec![0.5; 4]);

        engine.stop_capture();
        assert!(!engine.play(&[0.25; 4]));
        assert_eq!(backend.played().len(), 4);
    }

    #[test]
    fn test_deactivate_returns_to_unconfigured() {
        let backend = MockAudioBackend::new();
        let mut engine = engine_with(&backend, 4);
        let (tx, _rx) = unbounded::<AudioFrame>();
        engine.start_capture(tx).unwrap();

        engine.deactivate().unwrap();
        assert_eq!(engine.state(), EngineState::Unconfigured);
        assert!(!backend.is_tapped());
        assert!(!backend.is_configured());
        assert_eq!(backend.deactivate_calls(), 1);

        // Deactivating again does not touch the device
        engine.deactivate().unwrap();
        assert_eq!(backend.deactivate_calls(), 1);

        // And the next prewarm reconfigures
        engine.prewarm().unwrap();
        assert_eq!(backend.configure_calls(), 2);
    }

    #[test]
    fn test_deactivate_failure_is_reported() {
        let backend = MockAudioBackend::new().with_deactivate_failure();
        let mut engine = engine_with(&backend, 4);
        engine.prewarm().unwrap();

        assert!(engine.deactivate().is_err());
        assert_eq!(engine.state(), EngineState::Unconfigured);
    }
}
