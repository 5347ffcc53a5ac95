//! # Spiron Core
//!
//! Value types shared by every Spiron client:
//!
//! - **eddy**: [`EddyState`], the validated proposal record
//! - **geometry**: vector norms, distances and cosine similarity
//! - **encoding**: the canonical big-endian signing payload
//! - **signing**: the [`Signer`] capability and an Ed25519 implementation
//!
//! Nothing in this crate performs I/O; dispatching proposals to peers lives
//! in `spiron-client`.

#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]

pub mod eddy;
pub mod encoding;
pub mod error;
pub mod geometry;
pub mod signing;

pub use eddy::{EddyState, EddyStateBuilder};
pub use error::{EddyError, Result, SigningError};
pub use signing::{verify_signature, Ed25519Signer, Signer};

/// Re-exported so callers can hold verification keys without a direct dependency
pub use ed25519_dalek::VerifyingKey;
