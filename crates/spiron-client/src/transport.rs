//! Peer transport seam
//!
//! The wire protocol is not part of this crate. Peers are reached through a
//! [`PeerConnection`] produced by a [`PeerConnector`]; the dispatcher only
//! ever sees a method name, an opaque payload and a classified result.

use crate::config::TransportOptions;
use crate::error::{ConfigError, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// `host:port` address of one cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    /// Create an address from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.is_empty() {
            return Err(ConfigError::invalid("peers", "peer host cannot be empty"));
        }
        if port == 0 {
            return Err(ConfigError::invalid(
                "peers",
                format!("peer {host} has port 0"),
            ));
        }
        Ok(Self { host, port })
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for PeerAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(|| {
            ConfigError::invalid("peers", format!("peer '{s}' is not of the form host:port"))
        })?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ConfigError::invalid("peers", format!("peer '{s}' has a bad port: {e}")))?;
        Self::new(host, port)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(address: PeerAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Logical operation carried in the RPC method field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Offer an eddy state to the cluster
    Propose,
    /// Ask the cluster to commit an eddy state
    Commit,
}

impl Operation {
    /// RPC method name sent to the peer
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Propose => "spiron.Propose",
            Self::Commit => "spiron.Commit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Propose => f.write_str("propose"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// One logical connection to a peer
///
/// Handles are shared read-only between concurrent dispatches, so
/// implementations must tolerate concurrent `call`s.
pub trait PeerConnection: Send + Sync {
    /// Issue one RPC and wait for its response or a classified failure
    fn call(&self, method: &str, payload: &[u8], timeout: Duration)
        -> Result<Vec<u8>, TransportError>;

    /// Release the connection; called once, at client shutdown
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Factory for peer connections
pub trait PeerConnector: Send + Sync {
    /// Establish a connection handle to `peer`
    fn connect(
        &self,
        peer: &PeerAddress,
        options: &TransportOptions,
    ) -> Result<Arc<dyn PeerConnection>, TransportError>;
}

/// Stand-in handle for a peer that could not be connected at startup
///
/// Every call fails with
/// [`TransportErrorKind::Unavailable`](crate::TransportErrorKind::Unavailable).
#[derive(Debug, Clone)]
pub struct UnreachablePeer {
    peer: PeerAddress,
    reason: String,
}

impl UnreachablePeer {
    /// Create a handle remembering why the connection failed
    pub fn new(peer: PeerAddress, reason: impl Into<String>) -> Self {
        Self {
            peer,
            reason: reason.into(),
        }
    }
}

impl PeerConnection for UnreachablePeer {
    fn call(
        &self,
        _method: &str,
        _payload: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::unavailable(format!(
            "peer {} was never connected: {}",
            self.peer, self.reason
        )))
    }
}
