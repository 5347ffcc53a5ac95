//! Scripted peer transport
//!
//! A [`ScriptedPeer`] answers calls from a queue of canned results and falls
//! back to a fixed result once the queue is empty. Every call is logged so
//! tests can assert on attempt order and payloads.

use parking_lot::{Condvar, Mutex};
use spiron_client::{PeerAddress, PeerConnection, PeerConnector, TransportError, TransportOptions};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type CallResult = Result<Vec<u8>, TransportError>;

/// One call received by a [`ScriptedPeer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// RPC method name
    pub method: String,
    /// Request payload
    pub payload: Vec<u8>,
    /// Deadline handed down by the dispatcher
    pub timeout: Duration,
}

/// Peer that replays scripted results
#[derive(Debug)]
pub struct ScriptedPeer {
    address: PeerAddress,
    script: Mutex<VecDeque<CallResult>>,
    fallback: CallResult,
    calls: Mutex<Vec<CallRecord>>,
    closes: AtomicUsize,
    close_error: Option<TransportError>,
    gate: Option<Arc<Gate>>,
}

impl ScriptedPeer {
    /// Peer that accepts every call, echoing `b"ack"`
    pub fn accepting(address: PeerAddress) -> Self {
        Self::with_fallback(address, Ok(b"ack".to_vec()))
    }

    /// Peer that fails every call with `error`
    pub fn failing(address: PeerAddress, error: TransportError) -> Self {
        Self::with_fallback(address, Err(error))
    }

    fn with_fallback(address: PeerAddress, fallback: CallResult) -> Self {
        Self {
            address,
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            close_error: None,
            gate: None,
        }
    }

    /// Queue `result` ahead of the fallback
    pub fn then(self, result: CallResult) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Hold every call until `gate` opens
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make `close` report `error`
    pub fn with_close_error(mut self, error: TransportError) -> Self {
        self.close_error = Some(error);
        self
    }

    /// Address this peer was scripted for
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of times the connection was closed
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl PeerConnection for ScriptedPeer {
    fn call(&self, method: &str, payload: &[u8], timeout: Duration) -> CallResult {
        self.calls.lock().push(CallRecord {
            method: method.to_string(),
            payload: payload.to_vec(),
            timeout,
        });
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Connector handing out scripted peers by address
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    peers: HashMap<PeerAddress, Arc<ScriptedPeer>>,
    refused: HashMap<PeerAddress, TransportError>,
    connects: Mutex<Vec<PeerAddress>>,
}

impl ScriptedConnector {
    /// Connector with no peers; unknown addresses are refused
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` under its own address
    pub fn with_peer(mut self, peer: ScriptedPeer) -> Self {
        self.peers.insert(peer.address().clone(), Arc::new(peer));
        self
    }

    /// Register every peer in `peers`
    pub fn with_peers(self, peers: impl IntoIterator<Item = ScriptedPeer>) -> Self {
        peers.into_iter().fold(self, Self::with_peer)
    }

    /// Fail connecting to `address` with `error`
    pub fn refuse(mut self, address: PeerAddress, error: TransportError) -> Self {
        self.refused.insert(address, error);
        self
    }

    /// Scripted peer registered for `address`
    pub fn peer(&self, address: &PeerAddress) -> Option<Arc<ScriptedPeer>> {
        self.peers.get(address).cloned()
    }

    /// Addresses passed to `connect`, in order
    pub fn connect_log(&self) -> Vec<PeerAddress> {
        self.connects.lock().clone()
    }
}

impl PeerConnector for ScriptedConnector {
    fn connect(
        &self,
        peer: &PeerAddress,
        _options: &TransportOptions,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        self.connects.lock().push(peer.clone());
        if let Some(error) = self.refused.get(peer) {
            tracing::trace!(peer = %peer, "Refusing scripted connection");
            return Err(error.clone());
        }
        match self.peers.get(peer) {
            Some(scripted) => Ok(scripted.clone()),
            None => Err(TransportError::unavailable(format!(
                "no scripted peer for {peer}"
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Barrier that holds callers until it is opened
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    /// Closed gate
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until the gate is open
    pub fn pass(&self) {
        let mut state = self.state.lock();
        state.waiting += 1;
        self.changed.notify_all();
        while !state.open {
            self.changed.wait(&mut state);
        }
        state.waiting -= 1;
    }

    /// Release every current and future caller
    pub fn open(&self) {
        self.state.lock().open = true;
        self.changed.notify_all();
    }

    /// Wait until at least `count` callers are held, or `timeout` elapses
    pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.waiting < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.waiting >= count;
            }
        }
        true
    }
}
