use crate::audio::frame::AudioFrame;
use crate::config::RecognitionConfig;
use crate::error::{Result, TalkbackError};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result delivered by a recognition task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Best transcript so far of all audio appended to this session.
    Partial(String),
    /// The recognizer detected the end of the utterance.
    Finished,
    /// The task ended with an error. No further events follow.
    Failed(String),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Partial(_))
    }
}

/// A session event tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub sequence: u64,
    pub event: SessionEvent,
}

/// Where a recognition task delivers its results.
///
/// Cheap to clone; recognizers typically move a clone into their own
/// callback thread. Every event is tagged with the session sequence number
/// so the receiver can ignore sessions it already replaced.
#[derive(Clone)]
pub struct SessionSink {
    sequence: u64,
    deliver: Arc<dyn Fn(SessionMessage) -> bool + Send + Sync>,
}

impl SessionSink {
    /// Sink that forwards tagged events into a channel.
    pub fn from_channel<T>(sequence: u64, tx: Sender<T>) -> Self
    where
        T: From<SessionMessage> + Send + 'static,
    {
        Self {
            sequence,
            deliver: Arc::new(move |message| tx.send(T::from(message)).is_ok()),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns false once the receiver is gone.
    pub fn send(&self, event: SessionEvent) -> bool {
        (self.deliver)(SessionMessage {
            sequence: self.sequence,
            event,
        })
    }

    pub fn partial(&self, text: impl Into<String>) -> bool {
        self.send(SessionEvent::Partial(text.into()))
    }

    pub fn finished(&self) -> bool {
        self.send(SessionEvent::Finished)
    }

    pub fn failed(&self, message: impl Into<String>) -> bool {
        self.send(SessionEvent::Failed(message.into()))
    }
}

/// Trait for a bounded-duration speech recognition primitive.
///
/// This trait allows swapping implementations (platform recognizer vs mock).
pub trait Recognizer: Send + Sync {
    /// Start a new recognition task delivering results to `sink`.
    fn open(
        &self,
        config: &RecognitionConfig,
        sink: SessionSink,
    ) -> Result<Box<dyn RecognitionTask>>;

    /// Check if the recognizer can currently accept tasks
    fn is_available(&self) -> bool;

    /// Name of the recognizer for logging
    fn name(&self) -> &str;
}

/// One in-flight recognition computation.
pub trait RecognitionTask: Send {
    /// Feed one captured frame.
    fn append(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Signal that no more audio follows. The task still delivers a terminal event.
    fn end_audio(&mut self);
}

struct MockSession {
    sink: SessionSink,
    frames: Vec<AudioFrame>,
    ended: bool,
    locale: String,
}

#[derive(Default)]
struct MockRecognizerState {
    sessions: Vec<MockSession>,
}

/// Mock recognizer for testing.
///
/// Records the frames each opened task receives and lets the test emit
/// events on behalf of any session. Sessions are indexed in open order.
#[derive(Clone)]
pub struct MockRecognizer {
    state: Arc<Mutex<MockRecognizerState>>,
    available: bool,
    max_sessions: Option<usize>,
    failing_appends: Vec<(usize, usize)>,
    finish_on_end: bool,
}

impl MockRecognizer {
    /// Create a new mock recognizer with default settings
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockRecognizerState::default())),
            available: true,
            max_sessions: None,
            failing_appends: Vec::new(),
            finish_on_end: false,
        }
    }

    /// Configure the mock to report itself unavailable
    pub fn with_unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Configure the mock to refuse opening more than `count` sessions
    pub fn with_session_limit(mut self, count: usize) -> Self {
        self.max_sessions = Some(count);
        self
    }

    /// Configure the mock to fail the `nth` append (0-based) of session `session`
    pub fn with_append_failure(mut self, session: usize, nth: usize) -> Self {
        self.failing_appends.push((session, nth));
        self
    }

    /// Configure the mock to deliver `Finished` as soon as a task's audio ends,
    /// like platform recognizers finalizing after an early close
    pub fn with_finish_on_end(mut self) -> Self {
        self.finish_on_end = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockRecognizerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Frames appended to session `index`.
    pub fn frames(&self, index: usize) -> Vec<AudioFrame> {
        self.lock()
            .sessions
            .get(index)
            .map(|s| s.frames.clone())
            .unwrap_or_default()
    }

    /// Frame sequence numbers appended to session `index`.
    pub fn frame_sequences(&self, index: usize) -> Vec<u64> {
        self.frames(index).iter().map(|f| f.sequence).collect()
    }

    /// Whether session `index` was told its audio ended.
    pub fn is_ended(&self, index: usize) -> bool {
        self.lock().sessions.get(index).is_some_and(|s| s.ended)
    }

    /// Controller sequence number of session `index`.
    pub fn sequence(&self, index: usize) -> Option<u64> {
        self.lock().sessions.get(index).map(|s| s.sink.sequence())
    }

    pub fn locale(&self, index: usize) -> Option<String> {
        self.lock().sessions.get(index).map(|s| s.locale.clone())
    }

    /// Emit an event as session `index`. Returns false if there is no such session.
    pub fn emit(&self, index: usize, event: SessionEvent) -> bool {
        let sink = match self.lock().sessions.get(index) {
            Some(session) => session.sink.clone(),
            None => return false,
        };
        sink.send(event)
    }

    pub fn emit_partial(&self, index: usize, text: &str) -> bool {
        self.emit(index, SessionEvent::Partial(text.to_string()))
    }

    pub fn emit_finished(&self, index: usize) -> bool {
        self.emit(index, SessionEvent::Finished)
    }

    pub fn emit_failed(&self, index: usize, message: &str) -> bool {
        self.emit(index, SessionEvent::Failed(message.to_string()))
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for MockRecognizer {
    fn open(
        &self,
        config: &RecognitionConfig,
        sink: SessionSink,
    ) -> Result<Box<dyn RecognitionTask>> {
        let mut state = self.lock();
        if self.max_sessions.is_some_and(|max| state.sessions.len() >= max) {
            return Err(TalkbackError::Recognition {
                message: "mock recognizer session limit reached".to_string(),
            });
        }

        let index = state.sessions.len();
        state.sessions.push(MockSession {
            sink,
            frames: Vec::new(),
            ended: false,
            locale: config.locale.clone(),
        });

        Ok(Box::new(MockTask {
            recognizer: self.clone(),
            index,
            appends: 0,
        }))
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockTask {
    recognizer: MockRecognizer,
    index: usize,
    appends: usize,
}

impl RecognitionTask for MockTask {
    fn append(&mut self, frame: &AudioFrame) -> Result<()> {
        let nth = self.appends;
        self.appends += 1;
        if self.recognizer.failing_appends.contains(&(self.index, nth)) {
            return Err(TalkbackError::Recognition {
                message: format!("mock append {} rejected", nth),
            });
        }
        if let Some(session) = self.recognizer.lock().sessions.get_mut(self.index) {
            session.frames.push(frame.clone());
        }
        Ok(())
    }

    fn end_audio(&mut self) {
        let sink = {
            let mut state = self.recognizer.lock();
            match state.sessions.get_mut(self.index) {
                Some(session) => {
                    session.ended = true;
                    session.sink.clone()
                }
                None => return,
            }
        };
        if self.recognizer.finish_on_end {
            sink.finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_sink_tags_events_with_sequence() {
        let (tx, rx) = unbounded::<SessionMessage>();
        let sink = SessionSink::from_channel(7, tx);

        assert!(sink.partial("hello"));
        assert!(sink.finished());

        assert_eq!(
            rx.recv().unwrap(),
            SessionMessage {
                sequence: 7,
                event: SessionEvent::Partial("hello".to_string()),
            }
        );
        assert_eq!(rx.recv().unwrap().event, SessionEvent::Finished);
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = unbounded::<SessionMessage>();
        let sink = SessionSink::from_channel(0, tx);
        drop(rx);
        assert!(!sink.failed("gone"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(!SessionEvent::Partial("x".to_string()).is_terminal());
        assert!(SessionEvent::Finished.is_terminal());
        assert!(SessionEvent::Failed("x".to_string()).is_terminal());
    }

    #[test]
    fn test_mock_records_frames_per_session() {
        let recognizer = MockRecognizer::new();
        let (tx, _rx) = unbounded::<SessionMessage>();
        let config = RecognitionConfig::default();

        let mut first = recognizer
            .open(&config, SessionSink::from_channel(0, tx.clone()))
            .unwrap();
        let mut second = recognizer
            .open(&config, SessionSink::from_channel(1, tx))
            .unwrap();

        first.append(&AudioFrame::new(0, vec![0.0])).unwrap();
        second.append(&AudioFrame::new(1, vec![0.0])).unwrap();
        first.append(&AudioFrame::new(2, vec![0.0])).unwrap();

        assert_eq!(recognizer.session_count(), 2);
        assert_eq!(recognizer.frame_sequences(0), vec![0, 2]);
        assert_eq!(recognizer.frame_sequences(1), vec![1]);
        assert_eq!(recognizer.locale(0).as_deref(), Some("ja-JP"));
    }

    #[test]
    fn test_mock_session_limit() {
        let recognizer = MockRecognizer::new().with_session_limit(1);
        let (tx, _rx) = unbounded::<SessionMessage>();
        let config = RecognitionConfig::default();

        assert!(
            recognizer
                .open(&config, SessionSink::from_channel(0, tx.clone()))
                .is_ok()
        );
        assert!(
            recognizer
                .open(&config, SessionSink::from_channel(1, tx))
                .is_err()
        );
    }

    #[test]
    fn test_mock_append_failure() {
        let recognizer = MockRecognizer::new().with_append_failure(0, 1);
        let (tx, _rx) = unbounded::<SessionMessage>();
        let mut task = recognizer
            .open(
                &RecognitionConfig::default(),
                SessionSink::from_channel(0, tx),
            )
            .unwrap();

        assert!(task.append(&AudioFrame::new(0, vec![0.0])).is_ok());
        assert!(task.append(&AudioFrame::new(1, vec![0.0])).is_err());
        assert!(task.append(&AudioFrame::new(2, vec![0.0])).is_ok());
        assert_eq!(recognizer.frame_sequences(0), vec![0, 2]);
    }

    #[test]
    fn test_mock_finish_on_end() {
        let recognizer = MockRecognizer::new().with_finish_on_end();
        let (tx, rx) = unbounded::<SessionMessage>();
        let mut task = recognizer
            .open(
                &RecognitionConfig::default(),
                SessionSink::from_channel(3, tx),
            )
            .unwrap();

        task.end_audio();
        assert!(recognizer.is_ended(0));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionMessage {
                sequence: 3,
                event: SessionEvent::Finished,
            }
        );
    }
}
