//! Error types for eddy state construction and geometry
//!
//! Both kinds are local contract violations: they are surfaced to the caller
//! immediately and never retried by the dispatcher.

/// Errors raised by [`EddyState`](crate::EddyState) construction and its vector operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EddyError {
    /// An invariant on one of the state's fields does not hold
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Name of the offending field (`id`, `vector`, `energy`, ...)
        field: &'static str,
        /// Human readable description of the violation
        reason: String,
    },

    /// Two states with vectors of different lengths were combined
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the receiver
        expected: usize,
        /// Dimension of the other operand
        actual: usize,
    },

    /// A signature was attached to a state that is already signed
    #[error("Eddy state '{id}' is already signed")]
    SignatureAlreadySet {
        /// Identifier of the state
        id: String,
    },
}

impl EddyError {
    /// Create a validation error for `field`
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Name of the violated field, if this is a validation error
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Failure reported by a [`Signer`](crate::Signer)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Signing failed: {message}")]
pub struct SigningError {
    /// Description of what went wrong inside the signer
    pub message: String,
}

impl SigningError {
    /// Create a signing error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result alias for eddy state operations
pub type Result<T> = std::result::Result<T, EddyError>;
