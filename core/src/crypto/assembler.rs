//! Context-extension assembly.
//!
//! Both proof back-ends produce the same thing in the end: an opaque byte
//! payload attached to the pool input as a context-extension variable.
//! [`ExtensionAssembler`] is that seam: the ring and range back-ends differ
//! in witness shape but share the output type, so builders can hold either
//! behind one trait object.

use rand::rngs::OsRng;

use crate::crypto::curve::{Point, Scalar};
use crate::crypto::range::{self, RangeProof};
use crate::crypto::ring;
use crate::error::Result;

/// A proof back-end that turns a ring snapshot and witness into the payload
/// the on-chain script consumes.
pub trait ExtensionAssembler {
    fn assemble(&self, ring: &[Point], real_index: usize, secret: &Scalar) -> Result<Vec<u8>>;
}

/// DH-tuple ring back-end: the withdrawal proof bundle.
pub struct RingAssembler {
    pub denomination: u64,
    /// Transaction-binding message folded into the Fiat–Shamir challenge.
    pub message: Vec<u8>,
}

impl ExtensionAssembler for RingAssembler {
    fn assemble(&self, ring: &[Point], real_index: usize, secret: &Scalar) -> Result<Vec<u8>> {
        let witness = ring::build_ring_witness(
            ring,
            real_index,
            secret,
            self.denomination,
            &self.message,
            &mut OsRng,
        )?;
        Ok(ring::encode_ring_bundle(&witness))
    }
}

/// Bit-decomposition range back-end, for protocol extensions that carry
/// variable amounts. The ring snapshot is irrelevant to the statement; only
/// the secret's committed value matters.
pub struct RangeAssembler {
    pub value: u64,
}

impl ExtensionAssembler for RangeAssembler {
    fn assemble(&self, _ring: &[Point], _real_index: usize, secret: &Scalar) -> Result<Vec<u8>> {
        let proof = range::prove_range(secret, self.value, &mut OsRng)?;
        Ok(encode_range_proof(&proof))
    }
}

/// Serialize a range proof: bit count, then per bit the commitment, both
/// branch commitments, challenges, and responses.
pub fn encode_range_proof(proof: &RangeProof) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + proof.bits.len() * (3 * 33 + 4 * 32));
    out.push(proof.bits.len() as u8);
    for bit in &proof.bits {
        out.extend_from_slice(&bit.commitment.encode());
        out.extend_from_slice(&bit.branch_commitments[0].encode());
        out.extend_from_slice(&bit.branch_commitments[1].encode());
        out.extend_from_slice(&bit.challenges[0].to_bytes());
        out.extend_from_slice(&bit.challenges[1].to_bytes());
        out.extend_from_slice(&bit.responses[0].to_bytes());
        out.extend_from_slice(&bit.responses[1].to_bytes());
    }
    out
}
