//! Spiron client facade
//!
//! Owns the connection pool, the retry dispatcher and the worker pool for its
//! whole lifetime. Blocking calls run the dispatcher on the caller's thread;
//! the `_async` variants run the very same call on a worker.

use crate::bridge::{DispatchHandle, WorkerPool};
use crate::config::{BackoffConfig, ClientConfig, SaturationPolicy};
use crate::dispatch::{DispatchReceipt, RetryDispatcher, RetryPolicy};
use crate::error::{ConfigError, DispatchError};
use crate::events::{ClientEvent, EventSink, TracingSink};
use crate::pool::{ConnectionPool, PeerHealth};
use crate::transport::{Operation, PeerAddress, PeerConnector};
use parking_lot::RwLock;
use spiron_core::{EddyState, Signer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State shared between the caller-facing client and its worker tasks
struct Shared {
    pool: ConnectionPool,
    dispatcher: RetryDispatcher,
    /// Read-held by every running dispatch; `close` takes it for writing
    /// before the peer handles are closed
    in_flight: RwLock<()>,
}

impl Shared {
    fn dispatch(
        &self,
        operation: Operation,
        state: EddyState,
    ) -> Result<DispatchReceipt, DispatchError> {
        let _running = self.in_flight.read();
        self.dispatcher.dispatch(operation, state, &self.pool)
    }

    fn close_pool(&self) {
        let _quiesced = self.in_flight.write();
        self.pool.close_all();
    }
}

/// Client submitting eddy states to a Spiron cluster
///
/// ```no_run
/// # use std::sync::Arc;
/// # use spiron_client::{PeerAddress, PeerConnector, SpironClient};
/// # use spiron_core::EddyState;
/// # fn demo(connector: Arc<dyn PeerConnector>) -> Result<(), Box<dyn std::error::Error>> {
/// let client = SpironClient::builder()
///     .peers([
///         "localhost:8081".parse::<PeerAddress>()?,
///         "localhost:8082".parse::<PeerAddress>()?,
///     ])
///     .connector(connector)
///     .build()?;
///
/// let receipt = client.propose(EddyState::new("eddy-1", vec![0.9, 0.1], 1.5)?)?;
/// println!("accepted by {}", receipt.peer);
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct SpironClient {
    shared: Arc<Shared>,
    workers: WorkerPool,
    config: ClientConfig,
    sink: Arc<dyn EventSink>,
    closed: AtomicBool,
}

impl SpironClient {
    /// Start configuring a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build a client straight from a configuration
    pub fn from_config(
        config: ClientConfig,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self, ConfigError> {
        Self::builder().config(config).connector(connector).build()
    }

    /// Propose `state`, blocking until a peer accepts it or dispatch fails
    pub fn propose(&self, state: EddyState) -> Result<DispatchReceipt, DispatchError> {
        self.dispatch(Operation::Propose, state)
    }

    /// Commit `state`, blocking until a peer accepts it or dispatch fails
    pub fn commit(&self, state: EddyState) -> Result<DispatchReceipt, DispatchError> {
        self.dispatch(Operation::Commit, state)
    }

    /// Propose `state` on the worker pool
    pub fn propose_async(&self, state: EddyState) -> Result<DispatchHandle, DispatchError> {
        self.dispatch_async(Operation::Propose, state)
    }

    /// Commit `state` on the worker pool
    pub fn commit_async(&self, state: EddyState) -> Result<DispatchHandle, DispatchError> {
        self.dispatch_async(Operation::Commit, state)
    }

    /// Run `operation` for `state` on the calling thread
    pub fn dispatch(
        &self,
        operation: Operation,
        state: EddyState,
    ) -> Result<DispatchReceipt, DispatchError> {
        self.ensure_open()?;
        self.shared.dispatch(operation, state)
    }

    /// Run `operation` for `state` on a worker
    ///
    /// Submission errors ([`DispatchError::Saturated`], [`DispatchError::Closed`])
    /// are returned here; dispatch errors arrive through the handle.
    pub fn dispatch_async(
        &self,
        operation: Operation,
        state: EddyState,
    ) -> Result<DispatchHandle, DispatchError> {
        self.ensure_open()?;
        let shared = self.shared.clone();
        self.workers.spawn(move || shared.dispatch(operation, state))
    }

    /// Configured peers, in attempt order
    pub fn peers(&self) -> &[PeerAddress] {
        &self.config.peers
    }

    /// Connection state of every peer
    pub fn peer_health(&self) -> Vec<(PeerAddress, PeerHealth)> {
        self.shared.pool.health_report()
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the client down
    ///
    /// New calls are rejected at once. Queued async dispatches and every
    /// dispatch already running, blocking or async, finish before the peer
    /// connections are closed. Calling this again is a no-op. Must not be
    /// called from inside a dispatch.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.workers.close();
        self.shared.close_pool();
        self.sink.emit(&ClientEvent::ClientClosed);
    }

    fn ensure_open(&self) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        Ok(())
    }
}

impl Drop for SpironClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SpironClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpironClient")
            .field("pool", &self.shared.pool)
            .field("dispatcher", &self.shared.dispatcher)
            .field("workers", &self.workers)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`SpironClient`]
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn PeerConnector>>,
    signer: Option<Arc<dyn Signer>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ClientBuilder {
    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ordered peer list
    pub fn peers(mut self, peers: impl IntoIterator<Item = PeerAddress>) -> Self {
        self.config.peers = peers.into_iter().collect();
        self
    }

    /// Worker pool size for the async API
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Number of rounds over the peer list
    pub fn max_retries(mut self, rounds: u32) -> Self {
        self.config.max_retries = rounds;
        self
    }

    /// Capacity of the worker queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Behaviour when the worker queue is full
    pub fn saturation_policy(mut self, policy: SaturationPolicy) -> Self {
        self.config.saturation = policy;
        self
    }

    /// Pause between retry rounds
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = Some(backoff);
        self
    }

    /// Transport used to reach peers (required)
    pub fn connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sign every proposal before it is sent
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Where client events go; defaults to [`TracingSink`]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration, connect to the peers and start the workers
    pub fn build(self) -> Result<SpironClient, ConfigError> {
        let Self {
            config,
            connector,
            signer,
            sink,
        } = self;
        config.validate()?;
        let connector = connector
            .ok_or_else(|| ConfigError::invalid("connector", "a peer connector is required"))?;
        let sink = sink.unwrap_or_else(|| Arc::new(TracingSink));

        let pool = ConnectionPool::open(
            &config.peers,
            connector.as_ref(),
            &config.transport,
            sink.clone(),
        )?;

        let mut dispatcher = RetryDispatcher::new(RetryPolicy::from(&config), sink.clone());
        if let Some(signer) = signer {
            dispatcher = dispatcher.with_signer(signer);
        }

        let workers = match WorkerPool::new(
            config.worker_threads,
            config.queue_capacity,
            config.saturation,
            sink.clone(),
        ) {
            Ok(workers) => workers,
            Err(e) => {
                pool.close_all();
                return Err(e);
            }
        };

        sink.emit(&ClientEvent::ClientStarted {
            peers: config.peers.len(),
            workers: config.worker_threads,
        });

        Ok(SpironClient {
            shared: Arc::new(Shared {
                pool,
                dispatcher,
                in_flight: RwLock::new(()),
            }),
            workers,
            config,
            sink,
            closed: AtomicBool::new(false),
        })
    }
}
