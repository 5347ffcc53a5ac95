//! Proposal signing capability
//!
//! A [`Signer`] produces a signature over an eddy state's canonical bytes.
//! The client holds an optional signer and invokes it once per dispatch,
//! before the first attempt.

use crate::error::SigningError;
use crate::EddyState;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;

/// Capability that signs canonical proposal bytes
pub trait Signer: Send + Sync {
    /// Sign `payload`, returning the opaque signature bytes
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError>;
}

impl<F> Signer for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, SigningError> + Send + Sync,
{
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        self(payload)
    }
}

/// Ed25519 signer over the canonical encoding
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Create a signer from a 32-byte secret seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Derive a signer from arbitrary seed material (e.g. a node id)
    ///
    /// The seed is the SHA-256 digest of `material`.
    pub fn derive(material: &[u8]) -> Self {
        let digest = Sha256::digest(material);
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self::from_seed(seed)
    }

    /// Public half of the key, for verification on the receiving side
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(payload).to_bytes().to_vec())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &self.verifying_key().as_bytes())
            .finish_non_exhaustive()
    }
}

/// Check an attached Ed25519 signature against the state's canonical bytes
pub fn verify_signature(state: &EddyState, key: &VerifyingKey) -> Result<(), SigningError> {
    let bytes = state
        .signature()
        .ok_or_else(|| SigningError::new(format!("eddy state '{}' is not signed", state.id())))?;
    let signature = Signature::from_slice(bytes)
        .map_err(|e| SigningError::new(format!("malformed signature: {e}")))?;
    key.verify(&state.to_canonical_bytes(), &signature)
        .map_err(|e| SigningError::new(format!("signature does not verify: {e}")))?;

    tracing::trace!(id = state.id(), "Eddy signature verified");
    Ok(())
}
