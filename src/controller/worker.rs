//! Recognition worker: the single owner of session state during a recording.
//!
//! Captured frames, session results and the stop command all arrive through
//! one inbox, so they are handled in the order they were sent. The rotation
//! timer is the inbox receive deadline: a partial re-arms it, a natural
//! finish or a stop clears it, and reaching it rotates the session.

use crate::audio::frame::AudioFrame;
use crate::config::RecognitionConfig;
use crate::controller::error::{ErrorReporter, SessionError};
use crate::controller::stream::EventPublisher;
use crate::error::{Result, TalkbackError};
use crate::recognition::recognizer::{Recognizer, SessionEvent, SessionMessage, SessionSink};
use crate::recognition::session::{RecognitionSession, SessionState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Retired sessions kept around waiting for their terminal event.
const MAX_DRAINING_SESSIONS: usize = 4;

/// Messages accepted by the worker inbox.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Frame(AudioFrame),
    Session(SessionMessage),
    Stop,
}

impl From<AudioFrame> for WorkerMessage {
    fn from(frame: AudioFrame) -> Self {
        WorkerMessage::Frame(frame)
    }
}

impl From<SessionMessage> for WorkerMessage {
    fn from(message: SessionMessage) -> Self {
        WorkerMessage::Session(message)
    }
}

/// Counters for one recording, logged when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    pub sessions_opened: u64,
    pub rotations: u64,
    pub utterances: u64,
    pub frames_forwarded: u64,
}

type Flow = std::result::Result<(), SessionError>;

/// Runs once on the worker thread when a fatal error ends the recording,
/// before the stream carries the error.
pub(crate) type FatalHook = Box<dyn FnOnce() + Send>;

pub(crate) struct RecognitionWorker {
    recognizer: Arc<dyn Recognizer>,
    config: RecognitionConfig,
    rotation_delay: Duration,
    inbox: Sender<WorkerMessage>,
    publisher: EventPublisher,
    reporter: Arc<dyn ErrorReporter>,
    sequences: Arc<AtomicU64>,
    current: Option<RecognitionSession>,
    draining: VecDeque<RecognitionSession>,
    first_sequence: Option<u64>,
    utterance: u64,
    rotation_deadline: Option<Instant>,
    progressed: bool,
    on_fatal: Option<FatalHook>,
    summary: RecordingSummary,
}

impl RecognitionWorker {
    pub(crate) fn new(
        recognizer: Arc<dyn Recognizer>,
        config: RecognitionConfig,
        inbox: Sender<WorkerMessage>,
        publisher: EventPublisher,
        reporter: Arc<dyn ErrorReporter>,
        sequences: Arc<AtomicU64>,
    ) -> Self {
        Self {
            rotation_delay: config.rotation_delay(),
            recognizer,
            config,
            inbox,
            publisher,
            reporter,
            sequences,
            current: None,
            draining: VecDeque::new(),
            first_sequence: None,
            utterance: 0,
            rotation_deadline: None,
            progressed: false,
            on_fatal: None,
            summary: RecordingSummary::default(),
        }
    }

    pub(crate) fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.on_fatal = Some(hook);
        self
    }

    /// Open the first session of the recording.
    ///
    /// Runs on the caller's thread so a failure reaches `start_recording` directly.
    pub(crate) fn open_first(&mut self) -> Result<()> {
        let session = self.open_session()?;
        self.first_sequence = Some(session.sequence());
        self.current = Some(session);
        Ok(())
    }

    /// Close the first session without running; used when capture cannot start.
    pub(crate) fn abandon(mut self) {
        self.shutdown();
    }

    /// Process the inbox until `Stop` or a fatal session error.
    pub(crate) fn run(mut self, inbox: Receiver<WorkerMessage>) -> RecordingSummary {
        loop {
            if let Err(error) = self.rotate_if_due() {
                self.fail(error);
                break;
            }

            let message = match self.rotation_deadline {
                Some(deadline) => match inbox.recv_deadline(deadline) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match inbox.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            let flow = match message {
                WorkerMessage::Frame(frame) => self.forward(frame),
                WorkerMessage::Session(message) => self.on_session_message(message),
                WorkerMessage::Stop => break,
            };

            if let Err(error) = flow {
                self.fail(error);
                break;
            }
        }

        self.shutdown();
        info!(
            sessions = self.summary.sessions_opened,
            rotations = self.summary.rotations,
            utterances = self.summary.utterances,
            frames = self.summary.frames_forwarded,
            "recognition worker stopped"
        );
        self.summary
    }

    fn open_session(&mut self) -> Result<RecognitionSession> {
        let sequence = self.sequences.fetch_add(1, Ordering::SeqCst);
        let sink = SessionSink::from_channel(sequence, self.inbox.clone());
        let session = RecognitionSession::open(self.recognizer.as_ref(), &self.config, sink)?;
        self.summary.sessions_opened += 1;
        Ok(session)
    }

    fn replace_current(&mut self) -> Flow {
        let session = self.open_session().map_err(|e| {
            SessionError::Fatal(format!("could not open replacement session: {}", e))
        })?;
        self.current = Some(session);
        Ok(())
    }

    fn rotate_if_due(&mut self) -> Flow {
        match self.rotation_deadline {
            Some(deadline) if Instant::now() >= deadline => {
                debug!(
                    utterance = self.utterance,
                    "no partial within rotation delay, rotating session"
                );
                self.rotate()
            }
            _ => Ok(()),
        }
    }

    /// Close the current session and open its replacement. The utterance index is kept.
    fn rotate(&mut self) -> Flow {
        self.rotation_deadline = None;
        if let Some(mut session) = self.current.take() {
            session.close();
            self.retire(session);
        }
        self.summary.rotations += 1;
        self.replace_current()
    }

    fn retire(&mut self, session: RecognitionSession) {
        if self.draining.len() >= MAX_DRAINING_SESSIONS
            && let Some(stale) = self.draining.pop_front()
        {
            debug!(
                sequence = stale.sequence(),
                "dropping session that never delivered a terminal event"
            );
        }
        self.draining.push_back(session);
    }

    fn forward(&mut self, frame: AudioFrame) -> Flow {
        self.rotate_if_due()?;

        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        let sequence = session.sequence();

        match session.append(&frame) {
            Ok(_) => {
                self.summary.frames_forwarded += 1;
                Ok(())
            }
            Err(e) => {
                self.absorb(sequence, e.to_string())?;
                self.rotate()?;

                // The frame the failed session rejected goes to its replacement.
                if let Some(session) = self.current.as_mut() {
                    session.append(&frame).map_err(|e| {
                        SessionError::Fatal(format!("replacement session rejected audio: {}", e))
                    })?;
                    self.summary.frames_forwarded += 1;
                }
                Ok(())
            }
        }
    }

    fn on_session_message(&mut self, message: SessionMessage) -> Flow {
        let SessionMessage { sequence, event } = message;

        let is_current = self
            .current
            .as_ref()
            .is_some_and(|session| session.sequence() == sequence);
        if !is_current {
            self.observe_retired(sequence, &event);
            return Ok(());
        }

        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        if !session.observe(&event) {
            return Ok(());
        }

        match event {
            SessionEvent::Partial(text) => {
                self.progressed = true;
                self.publisher.partial(self.utterance, text);
                self.rotation_deadline = Some(Instant::now() + self.rotation_delay);
            }
            SessionEvent::Finished => {
                self.rotation_deadline = None;
                self.current = None;
                self.publisher.finish(self.utterance);
                debug!(utterance = self.utterance, sequence, "utterance finished");
                self.utterance += 1;
                self.summary.utterances += 1;
                self.replace_current()?;
            }
            SessionEvent::Failed(message) => {
                self.rotation_deadline = None;
                self.current = None;
                self.absorb(sequence, message)?;
                self.replace_current()?;
            }
        }
        Ok(())
    }

    /// Report a session failure that rotation can absorb, or return it when it cannot.
    ///
    /// Only the first session failing before any partial is fatal. Any later
    /// failure, however often it repeats, becomes a rotation.
    fn absorb(&mut self, sequence: u64, message: String) -> Flow {
        if self.first_sequence == Some(sequence) && !self.progressed {
            return Err(SessionError::Fatal(message));
        }
        let error = SessionError::Recoverable(message);
        self.reporter.report(sequence, &error);
        Ok(())
    }

    fn observe_retired(&mut self, sequence: u64, event: &SessionEvent) {
        match self.draining.iter().position(|s| s.sequence() == sequence) {
            Some(pos) => {
                self.draining[pos].observe(event);
                if self.draining[pos].state() == SessionState::Closed {
                    self.draining.remove(pos);
                    debug!(sequence, "retired session drained");
                }
            }
            None => debug!(sequence, "ignoring event from closed session"),
        }
    }

    fn fail(&mut self, error: SessionError) {
        let sequence = self
            .current
            .as_ref()
            .map(|s| s.sequence())
            .or(self.first_sequence)
            .unwrap_or_default();
        self.reporter.report(sequence, &error);
        if let Some(hook) = self.on_fatal.take() {
            hook();
        }
        self.publisher.close(Some(TalkbackError::Recognition {
            message: error.message().to_string(),
        }));
    }

    fn shutdown(&mut self) {
        self.rotation_deadline = None;
        if let Some(mut session) = self.current.take() {
            session.close();
        }
        self.draining.clear();
    }
}
