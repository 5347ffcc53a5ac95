//! Eddy state: the proposal record submitted to the peer cluster
//!
//! An eddy is a probabilistic consensus state characterised by an identifier,
//! a state vector and an energy value. Instances are validated on
//! construction and immutable afterwards, except that a signature may be
//! attached exactly once.

use crate::error::{EddyError, Result};
use crate::geometry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of leading vector components shown by the `Display` impl
const DISPLAY_PREVIEW: usize = 3;

/// A validated eddy state proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEddyState")]
pub struct EddyState {
    id: String,
    vector: Vec<f64>,
    energy: f64,
    timestamp: u64,
    signature: Option<Vec<u8>>,
}

/// Unvalidated wire shape; deserialization funnels through [`EddyStateBuilder`]
#[derive(Deserialize)]
struct RawEddyState {
    id: String,
    vector: Vec<f64>,
    energy: f64,
    timestamp: u64,
    signature: Option<Vec<u8>>,
}

impl TryFrom<RawEddyState> for EddyState {
    type Error = EddyError;

    fn try_from(raw: RawEddyState) -> Result<Self> {
        let mut builder =
            EddyState::builder(raw.id, raw.vector, raw.energy).timestamp(raw.timestamp);
        if let Some(signature) = raw.signature {
            builder = builder.signature(signature);
        }
        builder.build()
    }
}

impl EddyState {
    /// Create a state stamped with the current time
    pub fn new(id: impl Into<String>, vector: impl Into<Vec<f64>>, energy: f64) -> Result<Self> {
        Self::builder(id, vector, energy).build()
    }

    /// Start building a state with an explicit timestamp or signature
    pub fn builder(
        id: impl Into<String>,
        vector: impl Into<Vec<f64>>,
        energy: f64,
    ) -> EddyStateBuilder {
        EddyStateBuilder {
            id: id.into(),
            vector: vector.into(),
            energy,
            timestamp: None,
            signature: None,
        }
    }

    /// Caller-supplied identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// State vector
    pub fn vector(&self) -> &[f64] {
        &self.vector
    }

    /// Energy value
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Signature over [`to_canonical_bytes`](Self::to_canonical_bytes), if signed
    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Whether a signature has been attached
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Number of vector components
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Euclidean norm of the vector
    pub fn magnitude(&self) -> f64 {
        geometry::magnitude(&self.vector)
    }

    /// Attach a signature; fails if the state is already signed
    pub fn attach_signature(&mut self, signature: Vec<u8>) -> Result<()> {
        if self.signature.is_some() {
            return Err(EddyError::SignatureAlreadySet {
                id: self.id.clone(),
            });
        }
        self.signature = Some(signature);
        Ok(())
    }

    /// Copy of this state with its vector scaled to unit length
    ///
    /// A zero vector is returned unchanged. Otherwise the copy carries no
    /// signature, since the old one does not cover the new vector.
    pub fn normalize(&self) -> Self {
        let magnitude = self.magnitude();
        if magnitude == 0.0 {
            return self.clone();
        }
        Self {
            id: self.id.clone(),
            vector: self.vector.iter().map(|x| x / magnitude).collect(),
            energy: self.energy,
            timestamp: self.timestamp,
            signature: None,
        }
    }

    /// Euclidean distance between the two state vectors
    pub fn distance_to(&self, other: &EddyState) -> Result<f64> {
        self.check_dimension(other)?;
        Ok(geometry::euclidean_distance(&self.vector, &other.vector))
    }

    /// Cosine similarity in `[-1, 1]`; `0.0` if either vector is zero
    pub fn cosine_similarity(&self, other: &EddyState) -> Result<f64> {
        self.check_dimension(other)?;
        Ok(geometry::cosine_similarity(&self.vector, &other.vector))
    }

    fn check_dimension(&self, other: &EddyState) -> Result<()> {
        if self.dimension() != other.dimension() {
            return Err(EddyError::dimension_mismatch(
                self.dimension(),
                other.dimension(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for EddyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = &self.vector[..self.vector.len().min(DISPLAY_PREVIEW)];
        let ellipsis = if self.vector.len() > DISPLAY_PREVIEW {
            "..."
        } else {
            ""
        };
        write!(
            f,
            "EddyState(id='{}', dim={}, vector={preview:?}{ellipsis}, energy={:?})",
            self.id,
            self.dimension(),
            self.energy
        )
    }
}

/// Builder for [`EddyState`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct EddyStateBuilder {
    id: String,
    vector: Vec<f64>,
    energy: f64,
    timestamp: Option<u64>,
    signature: Option<Vec<u8>>,
}

impl EddyStateBuilder {
    /// Use an explicit timestamp instead of the construction time
    pub fn timestamp(mut self, millis: u64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Pre-attach a signature
    pub fn signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Validate the fields and produce the state
    pub fn build(self) -> Result<EddyState> {
        validate(&self.id, &self.vector, self.energy)?;
        Ok(EddyState {
            id: self.id,
            vector: self.vector,
            energy: self.energy,
            timestamp: self.timestamp.unwrap_or_else(now_millis),
            signature: self.signature,
        })
    }
}

fn validate(id: &str, vector: &[f64], energy: f64) -> Result<()> {
    if id.is_empty() {
        return Err(EddyError::validation("id", "eddy id cannot be empty"));
    }
    // Lengths are encoded as u32 prefixes in the canonical form.
    if u32::try_from(id.len()).is_err() {
        return Err(EddyError::validation("id", "eddy id is too long"));
    }
    if vector.is_empty() {
        return Err(EddyError::validation("vector", "vector cannot be empty"));
    }
    if u32::try_from(vector.len()).is_err() {
        return Err(EddyError::validation("vector", "vector is too long"));
    }
    if let Some((index, value)) = vector.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(EddyError::validation(
            "vector",
            format!("element {index} is not a finite number ({value})"),
        ));
    }
    if !energy.is_finite() {
        return Err(EddyError::validation(
            "energy",
            format!("energy must be a finite number ({energy})"),
        ));
    }
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
