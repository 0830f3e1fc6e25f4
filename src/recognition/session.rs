//! Lifecycle wrapper around one recognition task.

use crate::audio::frame::AudioFrame;
use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::recognition::recognizer::{RecognitionTask, Recognizer, SessionEvent, SessionSink};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting frames.
    Open,
    /// Audio ended, waiting for the terminal event.
    Draining,
    /// Terminal event received.
    Closed,
}

/// One bounded-duration unit of recognition.
///
/// Frames are forwarded straight to the task while Open. After `close` the
/// session only waits for its terminal event; anything appended is ignored.
pub struct RecognitionSession {
    sequence: u64,
    state: SessionState,
    task: Box<dyn RecognitionTask>,
    frames_appended: u64,
    partials: u64,
}

impl RecognitionSession {
    /// Open a task on `recognizer` whose results go to `sink`.
    pub fn open(
        recognizer: &dyn Recognizer,
        config: &RecognitionConfig,
        sink: SessionSink,
    ) -> Result<Self> {
        let sequence = sink.sequence();
        let task = recognizer.open(config, sink)?;
        debug!(sequence, recognizer = recognizer.name(), "recognition session opened");
        Ok(Self {
            sequence,
            state: SessionState::Open,
            task,
            frames_appended: 0,
            partials: 0,
        })
    }

    /// Feed a frame. Returns Ok(false) when the session no longer accepts audio.
    pub fn append(&mut self, frame: &AudioFrame) -> Result<bool> {
        if self.state != SessionState::Open {
            return Ok(false);
        }
        self.task.append(frame)?;
        self.frames_appended += 1;
        Ok(true)
    }

    /// Request early termination. No-op unless Open.
    pub fn close(&mut self) {
        if self.state == SessionState::Open {
            self.task.end_audio();
            self.state = SessionState::Draining;
            debug!(
                sequence = self.sequence,
                frames = self.frames_appended,
                "recognition session draining"
            );
        }
    }

    /// Record an event from this session's task.
    ///
    /// Returns false when the event arrived after the terminal one and must be ignored.
    pub fn observe(&mut self, event: &SessionEvent) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        if event.is_terminal() {
            self.state = SessionState::Closed;
        } else {
            self.partials += 1;
        }
        true
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn frames_appended(&self) -> u64 {
        self.frames_appended
    }

    pub fn partials(&self) -> u64 {
        self.partials
    }
}
