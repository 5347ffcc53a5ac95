//! Structured client events
//!
//! The client never logs through a global handle. Every noteworthy step is
//! handed to the [`EventSink`] injected at construction. [`TracingSink`]
//! forwards events to `tracing`; tests record them instead.

use crate::error::{TransportError, TransportErrorKind};
use crate::transport::{Operation, PeerAddress};
use tracing::Level;

/// Result of a single attempt against one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The peer accepted the request
    Delivered,
    /// The peer failed retryably; the dispatcher moves on
    Retrying(TransportErrorKind),
    /// The peer failed fatally; the dispatch is aborted
    Fatal(TransportErrorKind),
}

/// One attempt of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEvent {
    /// Operation being dispatched
    pub operation: Operation,
    /// Identifier of the eddy state
    pub eddy_id: String,
    /// Peer that was contacted
    pub peer: PeerAddress,
    /// 1-based attempt counter across the whole dispatch
    pub attempt: u32,
    /// 1-based round number
    pub round: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Failure detail, if any
    pub detail: Option<String>,
}

/// Event emitted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A peer attempt finished
    Attempt(AttemptEvent),
    /// Every attempt of a dispatch failed retryably
    Exhausted {
        /// Operation that was dispatched
        operation: Operation,
        /// Identifier of the eddy state
        eddy_id: String,
        /// Attempts made
        attempts: u32,
        /// Last recorded failure
        last: TransportError,
    },
    /// A peer connection was established at startup
    PeerConnected {
        /// Connected peer
        peer: PeerAddress,
    },
    /// A peer could not be connected at startup; its handle fails on use
    PeerConnectFailed {
        /// Peer that failed
        peer: PeerAddress,
        /// Why it failed
        error: TransportError,
    },
    /// A peer connection was closed at shutdown
    PeerClosed {
        /// Closed peer
        peer: PeerAddress,
        /// Close failure, if the transport reported one
        error: Option<TransportError>,
    },
    /// A worker recovered from a panicking task
    TaskPanicked {
        /// Index of the worker thread
        worker: usize,
    },
    /// The client finished construction
    ClientStarted {
        /// Number of configured peers
        peers: usize,
        /// Worker pool size
        workers: usize,
    },
    /// The client finished shutting down
    ClientClosed,
}

impl ClientEvent {
    /// Severity of the event
    pub fn level(&self) -> Level {
        match self {
            Self::Attempt(event) => match event.outcome {
                AttemptOutcome::Delivered => Level::DEBUG,
                AttemptOutcome::Retrying(_) => Level::WARN,
                AttemptOutcome::Fatal(_) => Level::ERROR,
            },
            Self::Exhausted { .. } | Self::TaskPanicked { .. } => Level::ERROR,
            Self::PeerConnectFailed { .. } => Level::WARN,
            Self::PeerClosed { error: Some(_), .. } => Level::WARN,
            Self::PeerClosed { error: None, .. } | Self::PeerConnected { .. } => Level::DEBUG,
            Self::ClientStarted { .. } | Self::ClientClosed => Level::INFO,
        }
    }
}

/// Receiver for client events
pub trait EventSink: Send + Sync {
    /// Handle one event; must not panic and should not block for long
    fn emit(&self, event: &ClientEvent);
}

/// Sink that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Attempt(attempt) => log_attempt(attempt),
            ClientEvent::Exhausted {
                operation,
                eddy_id,
                attempts,
                last,
            } => tracing::error!(
                %operation,
                eddy_id = %eddy_id,
                attempts,
                last_error = %last,
                "All dispatch attempts failed"
            ),
            ClientEvent::PeerConnected { peer } => {
                tracing::debug!(peer = %peer, "Connected to peer");
            }
            ClientEvent::PeerConnectFailed { peer, error } => {
                tracing::warn!(peer = %peer, error = %error, "Failed to connect to peer");
            }
            ClientEvent::PeerClosed { peer, error: None } => {
                tracing::debug!(peer = %peer, "Closed peer connection");
            }
            ClientEvent::PeerClosed {
                peer,
                error: Some(error),
            } => tracing::warn!(peer = %peer, error = %error, "Error closing peer connection"),
            ClientEvent::TaskPanicked { worker } => {
                tracing::error!(worker, "Dispatch task panicked");
            }
            ClientEvent::ClientStarted { peers, workers } => {
                tracing::info!(peers, workers, "SpironClient initialized");
            }
            ClientEvent::ClientClosed => tracing::info!("SpironClient closed"),
        }
    }
}

fn log_attempt(event: &AttemptEvent) {
    let AttemptEvent {
        operation,
        eddy_id,
        peer,
        attempt,
        round,
        outcome,
        detail,
    } = event;
    let detail = detail.as_deref().unwrap_or("");
    match outcome {
        AttemptOutcome::Delivered => tracing::debug!(
            %operation,
            eddy_id = %eddy_id,
            peer = %peer,
            attempt,
            round,
            "Delivered eddy state"
        ),
        AttemptOutcome::Retrying(kind) => tracing::warn!(
            %operation,
            eddy_id = %eddy_id,
            peer = %peer,
            attempt,
            round,
            kind = %kind,
            detail,
            "Peer attempt failed, trying next"
        ),
        AttemptOutcome::Fatal(kind) => tracing::error!(
            %operation,
            eddy_id = %eddy_id,
            peer = %peer,
            attempt,
            round,
            kind = %kind,
            detail,
            "Peer returned a fatal error"
        ),
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &ClientEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(outcome: AttemptOutcome) -> ClientEvent {
        ClientEvent::Attempt(AttemptEvent {
            operation: Operation::Propose,
            eddy_id: "e".into(),
            peer: "localhost:1".parse().unwrap(),
            attempt: 1,
            round: 1,
            outcome,
            detail: None,
        })
    }

    #[test]
    fn test_attempt_levels() {
        assert_eq!(attempt(AttemptOutcome::Delivered).level(), Level::DEBUG);
        assert_eq!(
            attempt(AttemptOutcome::Retrying(TransportErrorKind::Unavailable)).level(),
            Level::WARN
        );
        assert_eq!(
            attempt(AttemptOutcome::Fatal(TransportErrorKind::Rejected)).level(),
            Level::ERROR
        );
    }

    #[test]
    fn test_close_failure_is_a_warning() {
        let event = ClientEvent::PeerClosed {
            peer: "localhost:1".parse().unwrap(),
            error: Some(TransportError::internal("socket already gone")),
        };
        assert_eq!(event.level(), Level::WARN);
        TracingSink.emit(&event);
    }
}
