//! Error taxonomy for the pool client and relayer.
//!
//! Cryptographic and validation errors are fatal to the call and surface
//! unchanged. `Resolution` and `Capacity` are recoverable: the relayer
//! retries them against the next pool head. `Safety` is fatal to the action
//! but not to the process.

use thiserror::Error;

/// Failures in the curve layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("malformed point encoding")]
    BadEncoding,

    #[error("x coordinate is not on the curve")]
    NotOnCurve,

    #[error("point is the group identity")]
    Identity,

    #[error("scalar is zero or out of range")]
    BadScalar,
}

/// Pre-draft validation failures. Fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The key or nullifier is a protocol constant (`G` or `H`). Using `G`
    /// as a key image would permanently poison the nullifier set; using `H`
    /// would break the DH-tuple proof.
    #[error("banned point used as {role}")]
    BannedPoint { role: &'static str },

    #[error("stealth key already present in the ring at position {position}")]
    DuplicateKey { position: usize },

    #[error("nullifier already present in the spent set")]
    NullifierSpent,

    #[error("box value {got} does not match pool denomination {expected}")]
    DenominationMismatch { expected: u64, got: u64 },

    #[error("recipient script is empty or malformed")]
    InvalidRecipient,

    #[error("intent box {box_id} failed sweep-time validation: {reason}")]
    BadIntent { box_id: String, reason: String },
}

/// The single error type of the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("curve: {0}")]
    Curve(#[from] CurveError),

    #[error("commitment: {0}")]
    Commitment(String),

    #[error("proof: {0}")]
    Proof(String),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// Pool or intent box not found, or the head moved under us.
    /// The caller may retry against fresh state.
    #[error("resolution: {0}")]
    Resolution(String),

    /// The pool ring is at capacity. The caller must pick another pool.
    #[error("pool is full: {used}/{max} slots used")]
    Capacity { used: usize, max: u32 },

    #[error("safety: {0}")]
    Safety(String),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("node I/O: {0}")]
    NodeIo(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors the relayer retries on the next sweep instead of
    /// quarantining the intent.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Resolution(_) | Error::Capacity { .. } | Error::NodeIo(_))
    }
}
