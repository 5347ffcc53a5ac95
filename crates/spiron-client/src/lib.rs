//! # Spiron Client
//!
//! Client-side dispatcher for eddy state proposals. A [`SpironClient`] holds
//! one connection per configured peer and delivers each proposal to the first
//! peer that accepts it, retrying across peers and rounds under a bounded
//! [`RetryPolicy`].
//!
//! - **transport**: the [`PeerConnection`] / [`PeerConnector`] seam and peer addressing
//! - **pool**: eager per-peer connection handles with health reporting
//! - **dispatch**: the peer x round retry loop and failure classification
//! - **bridge**: a bounded worker pool behind the non-blocking API
//! - **config**: TOML configuration with `SPIRON_` environment overrides
//! - **events**: structured events routed to an injected [`EventSink`]
//!
//! The wire protocol itself is supplied by the caller through a
//! [`PeerConnector`].

#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]

pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pool;
pub mod transport;

pub use bridge::{DispatchHandle, DispatchResult, WorkerPool};
pub use client::{ClientBuilder, SpironClient};
pub use config::{BackoffConfig, ClientConfig, SaturationPolicy, TransportOptions, ENV_PREFIX};
pub use dispatch::{DispatchReceipt, RetryDispatcher, RetryPolicy};
pub use error::{ConfigError, DispatchError, TransportError, TransportErrorKind};
pub use events::{AttemptEvent, AttemptOutcome, ClientEvent, EventSink, NoopSink, TracingSink};
pub use pool::{ConnectionPool, PeerHealth};
pub use transport::{Operation, PeerAddress, PeerConnection, PeerConnector, UnreachablePeer};

pub use spiron_core::{EddyState, Ed25519Signer, Signer, SigningError};
