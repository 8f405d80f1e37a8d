//! Schnorr proof of knowledge of a discrete log on the base generator.
//!
//! Fiat–Shamir over Blake2b-256 with a domain tag. This is the primitive
//! behind the balance proofs: the statement is always `P = x·G`.

use rand::{CryptoRng, RngCore};

use crate::crypto::curve::{base_mul, blake2b256, random_scalar, Point, Scalar};
use crate::error::{Error, Result};

const DOMAIN: &[u8] = b"nightpool/schnorr/v1";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SchnorrProof {
    /// Prover commitment `R = k·G`.
    pub commitment: Point,
    /// Response `s = k + c·x`.
    pub response: Scalar,
}

fn challenge(commitment: &Point, statement: &Point, message: &[u8]) -> Scalar {
    let digest = blake2b256(&[DOMAIN, &commitment.encode(), &statement.encode(), message]);
    Scalar::from_hash(&digest)
}

/// Prove knowledge of `witness` for `statement = witness·G`.
pub fn prove<R: RngCore + CryptoRng>(
    witness: &Scalar,
    statement: &Point,
    message: &[u8],
    rng: &mut R,
) -> Result<SchnorrProof> {
    if base_mul(witness)? != *statement {
        return Err(Error::Proof("witness does not open the statement".into()));
    }
    let k = random_scalar(rng);
    let commitment = base_mul(&k)?;
    let c = challenge(&commitment, statement, message);
    Ok(SchnorrProof { commitment, response: k.add(&c.mul(witness)) })
}

/// Verify `s·G == R + c·P`.
pub fn verify(proof: &SchnorrProof, statement: &Point, message: &[u8]) -> bool {
    let c = challenge(&proof.commitment, statement, message);
    let lhs = match base_mul(&proof.response) {
        Ok(point) => point,
        Err(_) => return false,
    };
    let rhs = match statement.mul(&c).and_then(|cp| proof.commitment.add(&cp)) {
        Ok(point) => point,
        Err(_) => return false,
    };
    lhs == rhs
}
