//! Consumer-facing transcript event stream.
//!
//! Buffering policy: an undelivered `Partial` is replaced by a newer partial
//! of the same utterance instead of queueing behind it. `Finish` events are
//! always queued. The stream ends once the publisher closes it and every
//! queued event (and the closing error, if any) has been received.

use crate::error::{Result, TalkbackError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An item of the live transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Latest transcript of the given utterance; supersedes earlier partials.
    Partial { utterance: u64, text: String },
    /// The utterance is complete; the next partials belong to `utterance + 1`.
    Finish { utterance: u64 },
}

impl StreamEvent {
    pub fn utterance(&self) -> u64 {
        match self {
            StreamEvent::Partial { utterance, .. } | StreamEvent::Finish { utterance } => {
                *utterance
            }
        }
    }
}

#[derive(Default)]
struct Buffer {
    queue: VecDeque<StreamEvent>,
    closed: bool,
    error: Option<TalkbackError>,
}

#[derive(Default)]
struct Shared {
    buffer: Mutex<Buffer>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Creates a connected publisher/stream pair.
pub fn channel() -> (EventPublisher, EventStream) {
    let shared = Arc::new(Shared::default());
    (
        EventPublisher {
            shared: Arc::clone(&shared),
        },
        EventStream { shared },
    )
}

/// Writing side, held by the controller and its recognition worker.
#[derive(Clone)]
pub struct EventPublisher {
    shared: Arc<Shared>,
}

impl EventPublisher {
    /// Publish a partial transcript. Returns false if the stream is closed.
    pub fn partial(&self, utterance: u64, text: impl Into<String>) -> bool {
        let text = text.into();
        let mut buffer = self.shared.lock();
        if buffer.closed {
            return false;
        }
        let replaces_pending = matches!(
            buffer.queue.back(),
            Some(StreamEvent::Partial { utterance: pending, .. }) if *pending == utterance
        );
        if replaces_pending {
            if let Some(StreamEvent::Partial {
                text: pending_text, ..
            }) = buffer.queue.back_mut()
            {
                *pending_text = text;
            }
        } else {
            buffer.queue.push_back(StreamEvent::Partial { utterance, text });
        }
        drop(buffer);
        self.shared.ready.notify_all();
        true
    }

    /// Publish the end of an utterance. Returns false if the stream is closed.
    pub fn finish(&self, utterance: u64) -> bool {
        let mut buffer = self.shared.lock();
        if buffer.closed {
            return false;
        }
        buffer.queue.push_back(StreamEvent::Finish { utterance });
        drop(buffer);
        self.shared.ready.notify_all();
        true
    }

    /// Close the stream, optionally with an error delivered after the queued events.
    ///
    /// Only the first close counts; returns false if already closed.
    pub fn close(&self, error: Option<TalkbackError>) -> bool {
        let mut buffer = self.shared.lock();
        if buffer.closed {
            return false;
        }
        buffer.closed = true;
        buffer.error = error;
        drop(buffer);
        self.shared.ready.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

/// Reading side returned by `start_recording`.
///
/// `recv` yields `Some(Ok(event))` for each event, `Some(Err(e))` once if the
/// recording ended with an error, then `None` forever.
pub struct EventStream {
    shared: Arc<Shared>,
}

impl EventStream {
    fn take(buffer: &mut Buffer) -> Option<Option<Result<StreamEvent>>> {
        if let Some(event) = buffer.queue.pop_front() {
            return Some(Some(Ok(event)));
        }
        if buffer.closed {
            return Some(buffer.error.take().map(Err));
        }
        None
    }

    /// Block until the next event or the end of the stream.
    pub fn recv(&self) -> Option<Result<StreamEvent>> {
        let mut buffer = self.shared.lock();
        loop {
            if let Some(item) = Self::take(&mut buffer) {
                return item;
            }
            buffer = self
                .shared
                .ready
                .wait(buffer)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like `recv`, but gives up after `timeout`.
    ///
    /// Returns None both on timeout and at the end of the stream; use
    /// `is_terminated` to tell them apart.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<StreamEvent>> {
        let deadline = Instant::now() + timeout;
        let mut buffer = self.shared.lock();
        loop {
            if let Some(item) = Self::take(&mut buffer) {
                return item;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            buffer = self
                .shared
                .ready
                .wait_timeout(buffer, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Take the next item without blocking.
    pub fn try_recv(&self) -> Option<Result<StreamEvent>> {
        Self::take(&mut self.shared.lock()).flatten()
    }

    /// True once the stream is closed and fully drained.
    pub fn is_terminated(&self) -> bool {
        let buffer = self.shared.lock();
        buffer.closed && buffer.queue.is_empty() && buffer.error.is_none()
    }
}

impl Iterator for EventStream {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}
