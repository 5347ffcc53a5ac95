//! Retry dispatcher
//!
//! Delivers one eddy state to the cluster under a bounded peer x round
//! policy. For each round, peers are tried strictly in configured order:
//!
//! - success returns immediately
//! - a retryable failure (deadline exceeded, unavailable) is recorded and the
//!   next peer is tried
//! - any other failure aborts the dispatch on the spot
//!
//! When every attempt has failed retryably the error is classified from the
//! last recorded failure: timeouts become [`DispatchError::Timeout`],
//! unavailability becomes [`DispatchError::Connection`].

use crate::config::{BackoffConfig, ClientConfig};
use crate::error::{DispatchError, TransportError, TransportErrorKind};
use crate::events::{AttemptEvent, AttemptOutcome, ClientEvent, EventSink};
use crate::pool::ConnectionPool;
use crate::transport::{Operation, PeerAddress};
use spiron_core::{EddyState, Signer, SigningError};
use std::sync::Arc;
use std::time::Duration;

/// Attempt budget for one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Rounds over the full peer list
    pub max_rounds: u32,
    /// Deadline handed to every peer call
    pub per_attempt_timeout: Duration,
    /// Optional pause between rounds
    pub backoff: Option<BackoffConfig>,
}

impl RetryPolicy {
    /// Policy without backoff
    pub fn new(max_rounds: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_rounds,
            per_attempt_timeout,
            backoff: None,
        }
    }

    /// Pause between rounds according to `backoff`
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Delay before `round` (1-based); the first round never waits
    pub fn delay_before(&self, round: u32) -> Option<Duration> {
        if round <= 1 {
            return None;
        }
        self.backoff
            .as_ref()
            .map(|backoff| backoff.delay_for(round - 2))
            .filter(|delay| !delay.is_zero())
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_rounds: config.max_retries,
            per_attempt_timeout: config.timeout(),
            backoff: config.backoff.clone(),
        }
    }
}

/// Successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Operation that was delivered
    pub operation: Operation,
    /// Peer that accepted it
    pub peer: PeerAddress,
    /// Index of that peer in the configured order
    pub peer_index: usize,
    /// Round in which it was accepted (1-based)
    pub round: u32,
    /// Total attempts made, including the successful one
    pub attempts: u32,
    /// Opaque response payload from the peer
    pub response: Vec<u8>,
}

/// Signs, encodes and routes proposals across a [`ConnectionPool`]
pub struct RetryDispatcher {
    policy: RetryPolicy,
    signer: Option<Arc<dyn Signer>>,
    sink: Arc<dyn EventSink>,
}

impl RetryDispatcher {
    /// Create a dispatcher without a signer
    pub fn new(policy: RetryPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            policy,
            signer: None,
            sink,
        }
    }

    /// Sign every outgoing state with `signer`
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Active retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether outgoing states are signed
    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Deliver `state` to the first peer that accepts it
    ///
    /// The state is signed once, before the first attempt; a state that
    /// already carries a signature is sent unchanged.
    pub fn dispatch(
        &self,
        operation: Operation,
        mut state: EddyState,
        pool: &ConnectionPool,
    ) -> Result<DispatchReceipt, DispatchError> {
        if pool.is_closed() {
            return Err(DispatchError::Closed);
        }
        self.sign(&mut state)?;
        let payload =
            bincode::serialize(&state).map_err(|e| DispatchError::Encoding(e.to_string()))?;

        let method = operation.method_name();
        let mut attempts = 0u32;
        let mut last_error: Option<TransportError> = None;

        for round in 1..=self.policy.max_rounds {
            if let Some(delay) = self.policy.delay_before(round) {
                std::thread::sleep(delay);
            }

            for (peer_index, peer, connection) in pool.iter() {
                if pool.is_closed() {
                    return Err(DispatchError::Closed);
                }
                attempts += 1;
                let result = connection.call(method, &payload, self.policy.per_attempt_timeout);
                let mut event = AttemptEvent {
                    operation,
                    eddy_id: state.id().to_string(),
                    peer: peer.clone(),
                    attempt: attempts,
                    round,
                    outcome: AttemptOutcome::Delivered,
                    detail: None,
                };

                match result {
                    Ok(response) => {
                        self.sink.emit(&ClientEvent::Attempt(event));
                        return Ok(DispatchReceipt {
                            operation,
                            peer: peer.clone(),
                            peer_index,
                            round,
                            attempts,
                            response,
                        });
                    }
                    Err(error) if error.is_retryable() => {
                        event.outcome = AttemptOutcome::Retrying(error.kind);
                        event.detail = Some(error.message.clone());
                        self.sink.emit(&ClientEvent::Attempt(event));
                        last_error = Some(error);
                    }
                    Err(error) => {
                        event.outcome = AttemptOutcome::Fatal(error.kind);
                        event.detail = Some(error.message.clone());
                        self.sink.emit(&ClientEvent::Attempt(event));
                        return Err(DispatchError::Fatal {
                            peer: peer.clone(),
                            source: error,
                        });
                    }
                }
            }
        }

        Err(self.exhausted(operation, &state, attempts, last_error))
    }

    fn sign(&self, state: &mut EddyState) -> Result<(), DispatchError> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };
        if state.is_signed() {
            return Ok(());
        }
        let signature = signer.sign(&state.to_canonical_bytes())?;
        state
            .attach_signature(signature)
            .map_err(|e| SigningError::new(e.to_string()))?;
        Ok(())
    }

    fn exhausted(
        &self,
        operation: Operation,
        state: &EddyState,
        attempts: u32,
        last_error: Option<TransportError>,
    ) -> DispatchError {
        let last =
            last_error.unwrap_or_else(|| TransportError::unavailable("no peers were attempted"));
        self.sink.emit(&ClientEvent::Exhausted {
            operation,
            eddy_id: state.id().to_string(),
            attempts,
            last: last.clone(),
        });
        match last.kind {
            TransportErrorKind::DeadlineExceeded => DispatchError::Timeout { attempts, last },
            _ => DispatchError::Connection { attempts, last },
        }
    }
}

impl std::fmt::Debug for RetryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryDispatcher")
            .field("policy", &self.policy)
            .field("signed", &self.has_signer())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportOptions;
    use crate::events::NoopSink;
    use crate::transport::{PeerConnection, PeerConnector};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Peer answering from a fixed script; empty script means success
    struct Scripted {
        script: Mutex<VecDeque<TransportError>>,
        calls: Mutex<Vec<Vec<u8>>>,
    }

    impl PeerConnection for Scripted {
        fn call(&self, _: &str, payload: &[u8], _: Duration) -> Result<Vec<u8>, TransportError> {
            self.calls.lock().push(payload.to_vec());
            match self.script.lock().pop_front() {
                Some(error) => Err(error),
                None => Ok(b"ok".to_vec()),
            }
        }
    }

    struct Fixed(Vec<Arc<Scripted>>);

    impl PeerConnector for Fixed {
        fn connect(
            &self,
            peer: &PeerAddress,
            _: &TransportOptions,
        ) -> Result<Arc<dyn PeerConnection>, TransportError> {
            let index = usize::from(peer.port()) - 1;
            Ok(self.0[index].clone())
        }
    }

    fn scripted(errors: Vec<TransportError>) -> Arc<Scripted> {
        Arc::new(Scripted {
            script: Mutex::new(errors.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn pool_of(peers: &[Arc<Scripted>]) -> ConnectionPool {
        let addresses: Vec<PeerAddress> = (1..=peers.len())
            .map(|port| PeerAddress::new("peer", port as u16).unwrap())
            .collect();
        ConnectionPool::open(
            &addresses,
            &Fixed(peers.to_vec()),
            &TransportOptions::default(),
            Arc::new(NoopSink),
        )
        .unwrap()
    }

    fn dispatcher(rounds: u32) -> RetryDispatcher {
        RetryDispatcher::new(
            RetryPolicy::new(rounds, Duration::from_millis(50)),
            Arc::new(NoopSink),
        )
    }

    fn eddy() -> EddyState {
        EddyState::new("eddy-1", vec![0.9, 0.1], 1.5).unwrap()
    }

    #[test]
    fn test_recovers_on_second_peer() {
        let first = scripted(vec![TransportError::unavailable("down")]);
        let second = scripted(vec![]);
        let pool = pool_of(&[first, second.clone()]);

        let receipt = dispatcher(3)
            .dispatch(Operation::Propose, eddy(), &pool)
            .unwrap();
        assert_eq!(receipt.peer_index, 1);
        assert_eq!(receipt.round, 1);
        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.response, b"ok".to_vec());
        assert_eq!(second.calls.lock().len(), 1);
    }

    #[test]
    fn test_last_failure_decides_classification() {
        let peer = scripted(vec![
            TransportError::unavailable("down"),
            TransportError::deadline_exceeded("slow"),
        ]);
        let pool = pool_of(&[peer]);

        let err = dispatcher(2)
            .dispatch(Operation::Commit, eddy(), &pool)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { attempts: 2, .. }));
    }

    #[test]
    fn test_signer_runs_once_per_dispatch() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let signer = move |_: &[u8]| -> Result<Vec<u8>, SigningError> {
            *counter.lock() += 1;
            Ok(vec![0xAB; 4])
        };
        let peer = scripted(vec![
            TransportError::unavailable("down"),
            TransportError::unavailable("down"),
        ]);
        let pool = pool_of(&[peer.clone()]);

        dispatcher(3)
            .with_signer(Arc::new(signer))
            .dispatch(Operation::Propose, eddy(), &pool)
            .unwrap();

        assert_eq!(*calls.lock(), 1);
        let sent: EddyState = bincode::deserialize(&peer.calls.lock()[2]).unwrap();
        assert_eq!(sent.signature(), Some(&[0xAB; 4][..]));
    }

    #[test]
    fn test_presigned_state_is_not_resigned() {
        let signer = |_: &[u8]| -> Result<Vec<u8>, SigningError> {
            Err(SigningError::new("should not be called"))
        };
        let mut state = eddy();
        state.attach_signature(vec![1]).unwrap();
        let pool = pool_of(&[scripted(vec![])]);

        dispatcher(1)
            .with_signer(Arc::new(signer))
            .dispatch(Operation::Propose, state, &pool)
            .unwrap();
    }

    #[test]
    fn test_signer_failure_aborts_before_any_attempt() {
        let signer =
            |_: &[u8]| -> Result<Vec<u8>, SigningError> { Err(SigningError::new("hsm offline")) };
        let peer = scripted(vec![]);
        let pool = pool_of(&[peer.clone()]);

        let err = dispatcher(1)
            .with_signer(Arc::new(signer))
            .dispatch(Operation::Propose, eddy(), &pool)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Signing(_)));
        assert!(peer.calls.lock().is_empty());
    }

    #[test]
    fn test_closed_pool_rejects_dispatch() {
        let pool = pool_of(&[scripted(vec![])]);
        pool.close_all();
        let err = dispatcher(1)
            .dispatch(Operation::Propose, eddy(), &pool)
            .unwrap_err();
        assert_eq!(err, DispatchError::Closed);
    }

    /// Closes its own pool from inside the first call
    #[derive(Default)]
    struct ClosingPeer {
        pool: std::sync::OnceLock<std::sync::Weak<ConnectionPool>>,
        calls: Mutex<u32>,
    }

    impl PeerConnection for ClosingPeer {
        fn call(&self, _: &str, _: &[u8], _: Duration) -> Result<Vec<u8>, TransportError> {
            *self.calls.lock() += 1;
            if let Some(pool) = self.pool.get().and_then(std::sync::Weak::upgrade) {
                pool.close_all();
            }
            Err(TransportError::unavailable("shutting down"))
        }
    }

    struct Shared(Arc<ClosingPeer>);

    impl PeerConnector for Shared {
        fn connect(
            &self,
            _: &PeerAddress,
            _: &TransportOptions,
        ) -> Result<Arc<dyn PeerConnection>, TransportError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_pool_closed_mid_dispatch_stops_attempts() {
        let peer = Arc::new(ClosingPeer::default());
        let addresses = vec![
            PeerAddress::new("peer", 1).unwrap(),
            PeerAddress::new("peer", 2).unwrap(),
        ];
        let pool = Arc::new(
            ConnectionPool::open(
                &addresses,
                &Shared(peer.clone()),
                &TransportOptions::default(),
                Arc::new(NoopSink),
            )
            .unwrap(),
        );
        peer.pool.set(Arc::downgrade(&pool)).unwrap();

        let err = dispatcher(3)
            .dispatch(Operation::Propose, eddy(), &pool)
            .unwrap_err();
        assert_eq!(err, DispatchError::Closed);
        assert_eq!(*peer.calls.lock(), 1);
    }

    #[test]
    fn test_backoff_only_between_rounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10)).with_backoff(BackoffConfig {
            initial_ms: 5,
            max_ms: 100,
            multiplier: 2.0,
        });
        assert_eq!(policy.delay_before(1), None);
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(5)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(10)));
        assert_eq!(RetryPolicy::new(3, Duration::ZERO).delay_before(2), None);
    }
}
