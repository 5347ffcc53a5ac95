//! Client error taxonomy
//!
//! Transport failures carry an explicit [`TransportErrorKind`] tag. The
//! dispatcher inspects the tag to decide between retrying and aborting, and
//! folds the outcome into a single [`DispatchError`] for the caller.

use crate::transport::PeerAddress;
use serde::{Deserialize, Serialize};
use spiron_core::SigningError;
use std::fmt;
use std::path::PathBuf;

/// Classification of a failed peer call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// The call did not complete within its deadline
    DeadlineExceeded,
    /// The peer could not be reached
    Unavailable,
    /// The peer rejected the request as malformed
    InvalidArgument,
    /// The caller is not allowed to perform the operation
    PermissionDenied,
    /// The caller could not be authenticated
    Unauthenticated,
    /// The peer refused the proposal for an application reason
    Rejected,
    /// The peer failed while handling the request
    Internal,
}

impl TransportErrorKind {
    /// Whether a failure of this kind lets the dispatcher try the next peer
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Unavailable)
    }

    /// Stable lowercase name, used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Unavailable => "unavailable",
            Self::InvalidArgument => "invalid_argument",
            Self::PermissionDenied => "permission_denied",
            Self::Unauthenticated => "unauthenticated",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure returned by a [`PeerConnection`](crate::PeerConnection)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// Classification tag
    pub kind: TransportErrorKind,
    /// Detail message reported by the transport or peer
    pub message: String,
}

impl TransportError {
    /// Create a transport error of the given kind
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a deadline exceeded error
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::DeadlineExceeded, message)
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidArgument, message)
    }

    /// Create a rejected error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Internal, message)
    }

    /// Shorthand for `self.kind.is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Final outcome of a failed dispatch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Every attempt failed retryably and the last failure was a timeout
    #[error("All peers timed out after {attempts} attempts: {last}")]
    Timeout {
        /// Attempts made before giving up
        attempts: u32,
        /// Last recorded failure
        last: TransportError,
    },

    /// Every attempt failed retryably and the last failure was unavailability
    #[error("All peers unavailable after {attempts} attempts: {last}")]
    Connection {
        /// Attempts made before giving up
        attempts: u32,
        /// Last recorded failure
        last: TransportError,
    },

    /// A peer returned a non-retryable failure; no further attempts were made
    #[error("RPC error from {peer}: {source}")]
    Fatal {
        /// Peer that produced the failure
        peer: PeerAddress,
        /// Underlying failure
        source: TransportError,
    },

    /// The worker pool queue was full under the fail-fast policy
    #[error("Worker pool saturated: {capacity} tasks already queued")]
    Saturated {
        /// Configured queue capacity
        capacity: usize,
    },

    /// The client has been closed
    #[error("Spiron client is closed")]
    Closed,

    /// The configured signer failed
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The proposal could not be encoded for the wire
    #[error("Failed to encode proposal: {0}")]
    Encoding(String),

    /// The worker dropped the task without producing a result
    #[error("Dispatch task was lost before completion")]
    WorkerLost,
}

impl DispatchError {
    /// Whether this error ends a dispatch whose attempts all failed retryably
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }

    /// Attempt count carried by exhaustion errors
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Timeout { attempts, .. } | Self::Connection { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Errors raised while loading configuration or constructing a client
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is out of range or malformed
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid {
        /// Configuration key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The configuration file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`ClientConfig`](crate::ClientConfig)
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Worker threads could not be started
    #[error("Failed to start worker threads: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ConfigError {
    /// Create an invalid field error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_and_unavailable_are_retryable() {
        use TransportErrorKind::*;
        for kind in [DeadlineExceeded, Unavailable] {
            assert!(kind.is_retryable(), "{kind} should be retryable");
        }
        for kind in [InvalidArgument, PermissionDenied, Unauthenticated, Rejected, Internal] {
            assert!(!kind.is_retryable(), "{kind} should be fatal");
        }
    }

    #[test]
    fn test_fatal_error_carries_detail_message() {
        let err = DispatchError::Fatal {
            peer: "localhost:8081".parse().unwrap(),
            source: TransportError::invalid_argument("vector too large"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("localhost:8081"));
        assert!(rendered.contains("vector too large"));
        assert!(!err.is_exhausted());
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let err = DispatchError::Connection {
            attempts: 6,
            last: TransportError::unavailable("connection refused"),
        };
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), Some(6));
    }
}
