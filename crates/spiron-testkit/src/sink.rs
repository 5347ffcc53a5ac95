//! Event capture

use parking_lot::Mutex;
use spiron_client::{AttemptEvent, ClientEvent, EventSink, PeerAddress, TracingSink};

/// Sink that keeps every event and forwards it to `tracing`
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    /// Attempt events only, in emission order
    pub fn attempts(&self) -> Vec<AttemptEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::Attempt(attempt) => Some(attempt.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(round, peer)` of every attempt, in emission order
    pub fn attempt_trail(&self) -> Vec<(u32, PeerAddress)> {
        self.attempts()
            .into_iter()
            .map(|attempt| (attempt.round, attempt.peer))
            .collect()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&ClientEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|&event| predicate(event)).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ClientEvent) {
        TracingSink.emit(event);
        self.events.lock().push(event.clone());
    }
}
