//! Connection pool: one handle per configured peer
//!
//! Handles are created eagerly. A peer that cannot be connected does not
//! abort construction; it is recorded as [`PeerHealth::Failed`] and backed by
//! an [`UnreachablePeer`] handle that fails on first use. After construction
//! the pool is read-only until [`close_all`](ConnectionPool::close_all).

use crate::config::TransportOptions;
use crate::error::ConfigError;
use crate::events::{ClientEvent, EventSink};
use crate::transport::{PeerAddress, PeerConnection, PeerConnector, UnreachablePeer};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connection state of one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerHealth {
    /// A live handle was established
    Connected,
    /// Connecting failed at startup; calls fail as unavailable
    Failed {
        /// Why the connection failed
        reason: String,
    },
    /// The pool has been closed
    Closed,
}

struct PeerSlot {
    address: PeerAddress,
    connection: Arc<dyn PeerConnection>,
    health: PeerHealth,
}

/// Owns the per-peer connection handles for one client
pub struct ConnectionPool {
    slots: Vec<PeerSlot>,
    closed: AtomicBool,
    sink: Arc<dyn EventSink>,
}

impl ConnectionPool {
    /// Connect to every peer, in order
    pub fn open(
        peers: &[PeerAddress],
        connector: &dyn PeerConnector,
        options: &TransportOptions,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        if peers.is_empty() {
            return Err(ConfigError::invalid("peers", "at least one peer is required"));
        }

        let slots = peers
            .iter()
            .map(|address| match connector.connect(address, options) {
                Ok(connection) => {
                    sink.emit(&ClientEvent::PeerConnected {
                        peer: address.clone(),
                    });
                    PeerSlot {
                        address: address.clone(),
                        connection,
                        health: PeerHealth::Connected,
                    }
                }
                Err(error) => {
                    sink.emit(&ClientEvent::PeerConnectFailed {
                        peer: address.clone(),
                        error: error.clone(),
                    });
                    PeerSlot {
                        address: address.clone(),
                        connection: Arc::new(UnreachablePeer::new(
                            address.clone(),
                            error.message.clone(),
                        )),
                        health: PeerHealth::Failed {
                            reason: error.to_string(),
                        },
                    }
                }
            })
            .collect();

        Ok(Self {
            slots,
            closed: AtomicBool::new(false),
            sink,
        })
    }

    /// Number of peers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a pool built by [`open`](Self::open)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Address of the peer at `index`
    pub fn address(&self, index: usize) -> Option<&PeerAddress> {
        self.slots.get(index).map(|slot| &slot.address)
    }

    /// Shared handle for the peer at `index`; callers must not close it
    pub fn handle_for(&self, index: usize) -> Option<&dyn PeerConnection> {
        self.slots.get(index).map(|slot| slot.connection.as_ref())
    }

    /// Peers in attempt order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PeerAddress, &dyn PeerConnection)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (index, &slot.address, slot.connection.as_ref()))
    }

    /// Health of the peer at `index`
    pub fn health(&self, index: usize) -> Option<PeerHealth> {
        let slot = self.slots.get(index)?;
        if self.is_closed() {
            return Some(PeerHealth::Closed);
        }
        Some(slot.health.clone())
    }

    /// Health of every peer, in order
    pub fn health_report(&self) -> Vec<(PeerAddress, PeerHealth)> {
        (0..self.len())
            .filter_map(|index| Some((self.address(index)?.clone(), self.health(index)?)))
            .collect()
    }

    /// Number of peers whose connection succeeded
    pub fn connected_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.health == PeerHealth::Connected)
            .count()
    }

    /// Whether [`close_all`](Self::close_all) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every live handle, best effort; later calls are no-ops
    pub fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in self
            .slots
            .iter()
            .filter(|slot| slot.health == PeerHealth::Connected)
        {
            let error = slot.connection.close().err();
            self.sink.emit(&ClientEvent::PeerClosed {
                peer: slot.address.clone(),
                error,
            });
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("peers", &self.health_report())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::events::NoopSink;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingPeer {
        closes: Mutex<u32>,
        fail_close: bool,
    }

    impl PeerConnection for CountingPeer {
        fn call(&self, _: &str, payload: &[u8], _: Duration) -> Result<Vec<u8>, TransportError> {
            Ok(payload.to_vec())
        }

        fn close(&self) -> Result<(), TransportError> {
            *self.closes.lock() += 1;
            if self.fail_close {
                return Err(TransportError::internal("close failed"));
            }
            Ok(())
        }
    }

    /// Connects every peer except those on port 1
    struct PortConnector {
        peers: Mutex<Vec<Arc<CountingPeer>>>,
        fail_close: bool,
    }

    impl PeerConnector for PortConnector {
        fn connect(
            &self,
            peer: &PeerAddress,
            _: &TransportOptions,
        ) -> Result<Arc<dyn PeerConnection>, TransportError> {
            if peer.port() == 1 {
                return Err(TransportError::unavailable("connection refused"));
            }
            let connection = Arc::new(CountingPeer {
                fail_close: self.fail_close,
                ..CountingPeer::default()
            });
            self.peers.lock().push(connection.clone());
            Ok(connection)
        }
    }

    fn connector(fail_close: bool) -> PortConnector {
        PortConnector {
            peers: Mutex::new(Vec::new()),
            fail_close,
        }
    }

    fn addresses(raw: &[&str]) -> Vec<PeerAddress> {
        raw.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_failed_peer_does_not_abort_construction() {
        let connector = connector(false);
        let pool = ConnectionPool::open(
            &addresses(&["a:1", "b:2"]),
            &connector,
            &TransportOptions::default(),
            Arc::new(NoopSink),
        )
        .unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.connected_count(), 1);
        assert!(matches!(pool.health(0), Some(PeerHealth::Failed { .. })));
        assert_eq!(pool.health(1), Some(PeerHealth::Connected));

        let err = pool
            .handle_for(0)
            .unwrap()
            .call("m", b"x", Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Unavailable);
        assert_eq!(
            pool.handle_for(1)
                .unwrap()
                .call("m", b"x", Duration::from_millis(1))
                .unwrap(),
            b"x".to_vec()
        );
    }

    #[test]
    fn test_empty_peer_list_rejected() {
        let result = ConnectionPool::open(
            &[],
            &connector(false),
            &TransportOptions::default(),
            Arc::new(NoopSink),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_close_all_runs_once_and_tolerates_failures() {
        let connector = connector(true);
        let pool = ConnectionPool::open(
            &addresses(&["a:2", "b:3"]),
            &connector,
            &TransportOptions::default(),
            Arc::new(NoopSink),
        )
        .unwrap();

        pool.close_all();
        pool.close_all();

        for peer in connector.peers.lock().iter() {
            assert_eq!(*peer.closes.lock(), 1);
        }
        assert!(pool.is_closed());
        assert_eq!(pool.health(0), Some(PeerHealth::Closed));
    }
}
