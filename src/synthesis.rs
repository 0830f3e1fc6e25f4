//! Text to speech played through the shared duplex engine.
//!
//! Requests are queued to a dedicated thread and spoken in order. Each block
//! the synthesizer produces is scheduled on the engine output as soon as it
//! is ready; blocks produced after the engine stopped are dropped.

use crate::audio::duplex::{DuplexEngine, SharedDuplexEngine};
use crate::config::SynthesisConfig;
use crate::error::{Result, TalkbackError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Trait for a text-to-speech voice.
///
/// This trait allows swapping implementations (platform voice vs mock).
pub trait Synthesizer: Send + Sync {
    /// Render `text` at `sample_rate`, handing mono blocks to `emit` as they are produced.
    fn synthesize(
        &self,
        text: &str,
        config: &SynthesisConfig,
        sample_rate: u32,
        emit: &mut dyn FnMut(Vec<f32>),
    ) -> Result<()>;

    /// Name of the synthesizer for logging
    fn name(&self) -> &str;
}

fn lock_engine(engine: &SharedDuplexEngine) -> MutexGuard<'_, DuplexEngine> {
    engine.lock().unwrap_or_else(|e| e.into_inner())
}

/// Number of samples covering `ms` milliseconds at `sample_rate`.
pub fn silence_samples(ms: u32, sample_rate: u32) -> usize {
    (u64::from(sample_rate) * u64::from(ms) / 1000) as usize
}

/// Queues speech requests and plays them on the duplex engine.
pub struct SynthesisAdapter {
    requests: Option<Sender<String>>,
    pending: Arc<AtomicUsize>,
    engine: SharedDuplexEngine,
    handle: Option<JoinHandle<()>>,
}

impl SynthesisAdapter {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        config: SynthesisConfig,
        engine: SharedDuplexEngine,
    ) -> Result<Self> {
        let (tx, rx) = unbounded();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = SpeechWorker {
            synthesizer,
            config,
            engine: Arc::clone(&engine),
            pending: Arc::clone(&pending),
        };
        let handle = thread::Builder::new()
            .name("talkback-synthesis".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| TalkbackError::Synthesis {
                message: format!("could not start synthesis thread: {}", e),
            })?;

        Ok(Self {
            requests: Some(tx),
            pending,
            engine,
            handle: Some(handle),
        })
    }

    /// Queue `text` for playback.
    ///
    /// Returns false without queueing when the text is blank or the engine
    /// is not running.
    pub fn speak(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if !lock_engine(&self.engine).is_running() {
            debug!("engine not running, ignoring speak request");
            return false;
        }
        let Some(requests) = self.requests.as_ref() else {
            return false;
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if requests.send(text.to_string()).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// True when every queued request has been spoken or dropped.
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Wait up to `timeout` for the queue to empty. Returns `is_idle()`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.is_idle()
    }
}

impl Drop for SynthesisAdapter {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the queued requests.
        self.requests.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("synthesis thread panicked");
        }
    }
}

struct SpeechWorker {
    synthesizer: Arc<dyn Synthesizer>,
    config: SynthesisConfig,
    engine: SharedDuplexEngine,
    pending: Arc<AtomicUsize>,
}

impl SpeechWorker {
    fn run(self, requests: Receiver<String>) {
        for text in requests {
            if let Err(e) = self.speak(&text) {
                warn!(synthesizer = self.synthesizer.name(), "speech failed: {}", e);
            }
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn speak(&self, text: &str) -> Result<()> {
        let Some(format) = lock_engine(&self.engine).format() else {
            debug!("engine released before speech started");
            return Ok(());
        };
        let sample_rate = format.sample_rate;
        let volume = self.config.volume.clamp(0.0, 1.0);
        let mut dropped = 0usize;

        let mut play = |samples: &[f32]| {
            if !samples.is_empty() && !lock_engine(&self.engine).play(samples) {
                dropped += 1;
            }
        };

        play(&vec![0.0; silence_samples(self.config.pre_delay_ms, sample_rate)]);
        self.synthesizer
            .synthesize(text, &self.config, sample_rate, &mut |mut block| {
                if volume < 1.0 {
                    block.iter_mut().for_each(|s| *s *= volume);
                }
                play(&block);
            })?;
        play(&vec![0.0; silence_samples(self.config.post_delay_ms, sample_rate)]);

        if dropped > 0 {
            debug!(dropped, "engine stopped during speech, blocks dropped");
        }
        Ok(())
    }
}

/// Mock synthesizer for testing.
///
/// Produces a constant-amplitude block per character of text and records
/// every request it receives.
#[derive(Clone)]
pub struct MockSynthesizer {
    samples_per_char: usize,
    should_fail: bool,
    spoken: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            samples_per_char: 16,
            should_fail: false,
            spoken: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure how many samples each character renders to
    pub fn with_samples_per_char(mut self, count: usize) -> Self {
        self.samples_per_char = count;
        self
    }

    /// Configure the mock to fail every request
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts received so far, with the language they were requested in.
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        config: &SynthesisConfig,
        _sample_rate: u32,
        emit: &mut dyn FnMut(Vec<f32>),
    ) -> Result<()> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push((text.to_string(), config.language.clone()));
        }
        if self.should_fail {
            return Err(TalkbackError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        for _ in text.chars() {
            emit(vec![0.5; self.samples_per_char]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
