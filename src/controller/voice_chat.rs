//! Voice chat controller: continuous recognition plus spoken replies over one duplex engine.

use crate::audio::duplex::{DuplexEngine, SharedDuplexEngine};
use crate::audio::frame::StreamFormat;
use crate::config::Config;
use crate::controller::error::{ErrorReporter, LogReporter};
use crate::controller::stream::{self, EventPublisher, EventStream};
use crate::controller::worker::{FatalHook, RecognitionWorker, RecordingSummary, WorkerMessage};
use crate::error::{PermissionKind, Result, TalkbackError};
use crate::permission::PermissionProvider;
use crate::recognition::recognizer::Recognizer;
use crate::synthesis::{SynthesisAdapter, Synthesizer};
use crossbeam_channel::{Sender, unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Engine not configured.
    Idle,
    /// Device session being configured.
    Prewarming,
    /// Engine configured, not capturing.
    Ready,
    /// Capturing and recognizing.
    Recording,
    /// Tearing down a recording.
    Stopping,
}

struct ActiveRecording {
    inbox: Sender<WorkerMessage>,
    publisher: EventPublisher,
    handle: JoinHandle<RecordingSummary>,
}

/// Drives continuous recognition and speech playback on a shared duplex engine.
///
/// Lifecycle operations are serialized; `state()` and `speak()` never wait
/// for them.
pub struct VoiceChatController {
    config: Config,
    engine: SharedDuplexEngine,
    recognizer: Arc<dyn Recognizer>,
    permissions: Arc<dyn PermissionProvider>,
    synthesis: SynthesisAdapter,
    reporter: Arc<dyn ErrorReporter>,
    authorized: AtomicBool,
    state: Arc<Mutex<ControllerState>>,
    recording: Mutex<Option<ActiveRecording>>,
    sequences: Arc<AtomicU64>,
}

impl VoiceChatController {
    pub fn new(
        config: Config,
        engine: SharedDuplexEngine,
        recognizer: Arc<dyn Recognizer>,
        synthesizer: Arc<dyn Synthesizer>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let synthesis =
            SynthesisAdapter::new(synthesizer, config.synthesis.clone(), Arc::clone(&engine))?;

        Ok(Self {
            config,
            engine,
            recognizer,
            permissions,
            synthesis,
            reporter: Arc::new(LogReporter),
            authorized: AtomicBool::new(false),
            state: Arc::new(Mutex::new(ControllerState::Idle)),
            recording: Mutex::new(None),
            sequences: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Replace the reporter that receives absorbed and fatal session errors.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Ask for recognition authorization, then microphone access.
    pub async fn request_permission(&self) -> Result<()> {
        if !self.permissions.request_recognition().await {
            return Err(TalkbackError::PermissionDenied {
                kind: PermissionKind::Recognition,
            });
        }
        if !self.permissions.request_capture().await {
            return Err(TalkbackError::PermissionDenied {
                kind: PermissionKind::Capture,
            });
        }
        self.authorized.store(true, Ordering::SeqCst);
        info!("recognition and capture authorized");
        Ok(())
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ControllerState {
        *self.lock_state()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configure the device session ahead of recording so the first frame is not delayed.
    pub fn prewarm(&self) -> Result<StreamFormat> {
        self.ensure_authorized()?;
        let _lifecycle = self.lock_recording();
        self.prewarm_engine()
    }

    /// Start continuous recognition and return its transcript stream.
    ///
    /// Prewarms first when needed. The stream stays live across session
    /// rotations until `stop_recording` or a fatal recognition error. Fails
    /// with `AlreadyRecording` when this or another controller is capturing
    /// on the shared engine.
    pub fn start_recording(&self) -> Result<EventStream> {
        self.ensure_authorized()?;
        let mut recording = self.lock_recording();

        if recording
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished() && !active.publisher.is_closed())
        {
            return Err(TalkbackError::AlreadyRecording);
        }
        // The previous recording ended on a fatal error but was never stopped.
        if let Some(stale) = recording.take() {
            self.finish(stale);
        }
        if self.lock_engine().is_running() {
            debug!("engine already capturing for another controller");
            return Err(TalkbackError::AlreadyRecording);
        }

        if !self.recognizer.is_available() {
            return Err(TalkbackError::RecognizerUnavailable);
        }
        let format = self.prewarm_engine()?;

        let (inbox, rx) = unbounded();
        let (publisher, events) = stream::channel();
        let mut worker = RecognitionWorker::new(
            Arc::clone(&self.recognizer),
            self.config.recognition.clone(),
            inbox.clone(),
            publisher.clone(),
            Arc::clone(&self.reporter),
            Arc::clone(&self.sequences),
        )
        .with_fatal_hook(self.fatal_cleanup());
        worker.open_first()?;

        // Frames queue in the inbox until the worker thread picks them up.
        let started = self.lock_engine().start_capture(inbox.clone());
        if let Err(e) = started {
            worker.abandon();
            publisher.close(None);
            return Err(match e {
                TalkbackError::AlreadyRunning => TalkbackError::AlreadyRecording,
                other => other,
            });
        }
        self.set_state(ControllerState::Recording);

        let handle = match thread::Builder::new()
            .name("talkback-recognition".to_string())
            .spawn(move || worker.run(rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.lock_engine().stop_capture();
                publisher.close(None);
                self.set_state(ControllerState::Ready);
                return Err(TalkbackError::Other(format!(
                    "could not start recognition thread: {}",
                    e
                )));
            }
        };

        info!(
            recognizer = self.recognizer.name(),
            locale = %self.config.recognition.locale,
            sample_rate = format.sample_rate,
            "recording started"
        );

        *recording = Some(ActiveRecording {
            inbox,
            publisher,
            handle,
        });
        Ok(events)
    }

    /// Stop capture, flush already captured audio and end the transcript stream.
    ///
    /// The device session is released; the next recording prewarms again.
    /// Calling this when not recording does nothing.
    pub fn stop_recording(&self) {
        let mut recording = self.lock_recording();
        if let Some(active) = recording.take() {
            self.finish(active);
        }
    }

    /// Speak `text` on the engine output. Returns false when nothing was queued.
    ///
    /// Only acts while the engine is running.
    pub fn speak(&self, text: &str) -> bool {
        self.synthesis.speak(text)
    }

    /// True once every queued `speak` request has played or been dropped.
    pub fn is_speech_idle(&self) -> bool {
        self.synthesis.is_idle()
    }

    fn finish(&self, active: ActiveRecording) {
        self.set_state(ControllerState::Stopping);

        // No frame is captured after this, so Stop lands behind the last one.
        self.lock_engine().stop_capture();
        active.inbox.send(WorkerMessage::Stop).ok();

        let mut error = match active.handle.join() {
            Ok(summary) => {
                debug!(?summary, "recognition worker joined");
                None
            }
            Err(_) => {
                warn!("recognition thread panicked");
                Some(TalkbackError::Other(
                    "recognition worker panicked".to_string(),
                ))
            }
        };

        if let Err(e) = self.lock_engine().deactivate() {
            error.get_or_insert(e);
        }
        active.publisher.close(error);

        self.set_state(ControllerState::Idle);
        info!("recording stopped");
    }

    /// Release the engine and report not-recording once a fatal error ends the stream.
    fn fatal_cleanup(&self) -> FatalHook {
        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);
        Box::new(move || {
            {
                let mut engine = engine.lock().unwrap_or_else(|e| e.into_inner());
                engine.stop_capture();
                if let Err(e) = engine.deactivate() {
                    warn!(error = %e, "could not release audio session after fatal error");
                }
            }
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ControllerState::Recording {
                debug!(from = ?*state, to = ?ControllerState::Idle, "controller state");
                *state = ControllerState::Idle;
            }
            info!("recording ended by recognition failure");
        })
    }

    fn prewarm_engine(&self) -> Result<StreamFormat> {
        let previous = self.state();
        if previous == ControllerState::Idle {
            self.set_state(ControllerState::Prewarming);
        }

        let result = self.lock_engine().prewarm();

        if matches!(previous, ControllerState::Idle | ControllerState::Ready) {
            self.set_state(if result.is_ok() {
                ControllerState::Ready
            } else {
                ControllerState::Idle
            });
        }
        result
    }

    fn ensure_authorized(&self) -> Result<()> {
        if self.is_authorized() {
            Ok(())
        } else {
            Err(TalkbackError::NotAuthorized)
        }
    }

    fn set_state(&self, state: ControllerState) {
        let mut current = self.lock_state();
        if *current != state {
            debug!(from = ?*current, to = ?state, "controller state");
            *current = state;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_recording(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        self.recording.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_engine(&self) -> MutexGuard<'_, DuplexEngine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for VoiceChatController {
    fn drop(&mut self) {
        self.stop_recording();
    }
}
