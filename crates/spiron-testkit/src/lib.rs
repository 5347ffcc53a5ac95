//! Spiron Testing Infrastructure
//!
//! Scripted peer transports, event capture and small fixtures shared by the
//! client test suites. Nothing here opens a socket: every peer answers from a
//! script held in memory.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spiron_client::{SpironClient, TransportError};
//! use spiron_testkit::*;
//!
//! let peers = addresses(2);
//! let connector = ScriptedConnector::new()
//!     .with_peer(ScriptedPeer::failing(
//!         peers[0].clone(),
//!         TransportError::unavailable("down"),
//!     ))
//!     .with_peer(ScriptedPeer::accepting(peers[1].clone()));
//!
//! let client = SpironClient::builder()
//!     .peers(peers)
//!     .connector(Arc::new(connector))
//!     .build()
//!     .unwrap();
//! client.propose(eddy("eddy-1", 3)).unwrap();
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod peer;
pub mod sink;

pub use fixtures::*;
pub use peer::{CallRecord, Gate, ScriptedConnector, ScriptedPeer};
pub use sink::RecordingSink;
