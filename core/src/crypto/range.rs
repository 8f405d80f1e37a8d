//! Bit-decomposition range proofs: `0 ≤ v < 2^64`.
//!
//! `v` splits into 64 bit commitments `C_k = r_k·G + b_k·2^k·H` with the
//! blinding factors summing to the original `r`, so `Σ C_k` recombines to
//! the value commitment. Each bit carries a two-branch Sigma OR showing
//! `C_k` commits to `0` or to `2^k` without revealing which.
//!
//! The fixed-denomination pool only needs the sanity pre-check that a
//! commitment opens to the denomination; this module is the variable-amount
//! extension path, validated off-chain before a transaction ever reaches
//! the mempool.

use rand::{CryptoRng, RngCore};

use crate::crypto::curve::{base_mul, blake2b256, nums_h, random_scalar, Point, Scalar};
use crate::crypto::pedersen::{self, Commitment};
use crate::error::{Error, Result};

const OR_DOMAIN: &[u8] = b"nightpool/range-or/v1";
const BITS: usize = 64;

/// One bit's OR transcript over the targets `P_0 = C_k` and
/// `P_1 = C_k − 2^k·H`.
#[derive(Clone, Copy, Debug)]
pub struct BitProof {
    pub commitment: Point,
    pub branch_commitments: [Point; 2],
    pub challenges: [Scalar; 2],
    pub responses: [Scalar; 2],
}

#[derive(Clone, Debug)]
pub struct RangeProof {
    pub bits: Vec<BitProof>,
}

fn bit_challenge(index: usize, commitment: &Point, branches: &[Point; 2]) -> Scalar {
    let digest = blake2b256(&[
        OR_DOMAIN,
        &(index as u32).to_be_bytes(),
        &commitment.encode(),
        &branches[0].encode(),
        &branches[1].encode(),
    ]);
    Scalar::from_hash(&digest)
}

fn or_targets(index: usize, commitment: &Point) -> Result<[Point; 2]> {
    let weight = nums_h().mul(&Scalar::from_u64(1u64 << index))?;
    Ok([*commitment, commitment.sub(&weight)?])
}

/// `acc + scalar·base`, tolerating a zero scalar.
fn add_term(acc: &Point, base: &Point, scalar: &Scalar) -> Result<Point> {
    if scalar.is_zero() {
        return Ok(*acc);
    }
    Ok(acc.add(&base.mul(scalar)?)?)
}

/// Prove that `commit(r, value)` commits to a 64-bit value.
pub fn prove_range<R: RngCore + CryptoRng>(
    r: &Scalar,
    value: u64,
    rng: &mut R,
) -> Result<RangeProof> {
    // Blindings for bits 0..62 are fresh; the last absorbs the remainder so
    // the plain sum equals r.
    let mut blindings: Vec<Scalar> = Vec::with_capacity(BITS);
    let mut partial = Scalar::ZERO;
    for _ in 0..BITS - 1 {
        let rk = random_scalar(rng);
        partial = partial.add(&rk);
        blindings.push(rk);
    }
    let last = r.sub(&partial);
    if last.is_zero() {
        return Err(Error::Proof("range decomposition failed: degenerate blinding".into()));
    }
    blindings.push(last);

    let mut bits = Vec::with_capacity(BITS);
    for (k, rk) in blindings.iter().enumerate() {
        let bit = (value >> k) & 1;
        let committed = if bit == 1 { 1u64 << k } else { 0 };
        let commitment = *pedersen::commit(rk, committed)?.as_point();
        let targets = or_targets(k, &commitment)?;

        let real = bit as usize;
        let decoy = 1 - real;

        // Simulate the false branch, commit honestly on the true one.
        let decoy_challenge = random_scalar(rng);
        let decoy_response = random_scalar(rng);
        let decoy_commitment = add_term(
            &base_mul(&decoy_response)?,
            &targets[decoy],
            &decoy_challenge.negate(),
        )?;

        let nonce = random_scalar(rng);
        let real_commitment = base_mul(&nonce)?;

        let mut branch_commitments = [real_commitment; 2];
        branch_commitments[decoy] = decoy_commitment;

        let total = bit_challenge(k, &commitment, &branch_commitments);
        let real_challenge = total.sub(&decoy_challenge);
        let real_response = nonce.add(&real_challenge.mul(rk));

        let mut challenges = [real_challenge; 2];
        challenges[decoy] = decoy_challenge;
        let mut responses = [real_response; 2];
        responses[decoy] = decoy_response;

        bits.push(BitProof { commitment, branch_commitments, challenges, responses });
    }

    Ok(RangeProof { bits })
}

/// Verify a range proof against the value commitment it decomposes.
pub fn verify_range(proof: &RangeProof, commitment: &Commitment) -> bool {
    if proof.bits.len() != BITS {
        return false;
    }

    // The bit commitments must recombine to the value commitment.
    let mut acc: Option<Point> = None;
    for bit in &proof.bits {
        acc = match acc {
            None => Some(bit.commitment),
            Some(prev) => match prev.add(&bit.commitment) {
                Ok(sum) => Some(sum),
                Err(_) => return false,
            },
        };
    }
    if acc != Some(commitment.0) {
        return false;
    }

    for (k, bit) in proof.bits.iter().enumerate() {
        let targets = match or_targets(k, &bit.commitment) {
            Ok(targets) => targets,
            Err(_) => return false,
        };
        let total = bit_challenge(k, &bit.commitment, &bit.branch_commitments);
        if bit.challenges[0].add(&bit.challenges[1]) != total {
            return false;
        }
        for branch in 0..2 {
            if bit.responses[branch].is_zero() {
                return false;
            }
            let lhs = match base_mul(&bit.responses[branch]) {
                Ok(point) => point,
                Err(_) => return false,
            };
            let rhs = match add_term(
                &bit.branch_commitments[branch],
                &targets[branch],
                &bit.challenges[branch],
            ) {
                Ok(point) => point,
                Err(_) => return false,
            };
            if lhs != rhs {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn range_proof_roundtrip() {
        let r = random_scalar(&mut OsRng);
        let value = 0xdead_beef_u64;
        let commitment = pedersen::commit(&r, value).unwrap();
        let proof = prove_range(&r, value, &mut OsRng).unwrap();
        assert!(verify_range(&proof, &commitment));
    }

    #[test]
    fn range_proof_rejects_foreign_commitment() {
        let r = random_scalar(&mut OsRng);
        let proof = prove_range(&r, 77, &mut OsRng).unwrap();
        let other = pedersen::commit(&random_scalar(&mut OsRng), 77).unwrap();
        assert!(!verify_range(&proof, &other));
    }

    #[test]
    fn range_proof_rejects_tampered_bit() {
        let r = random_scalar(&mut OsRng);
        let commitment = pedersen::commit(&r, 1).unwrap();
        let mut proof = prove_range(&r, 1, &mut OsRng).unwrap();
        proof.bits[0].challenges[0] = proof.bits[0].challenges[0].add(&Scalar::ONE);
        assert!(!verify_range(&proof, &commitment));
    }

    #[test]
    fn extreme_values() {
        for value in [0u64, 1, u64::MAX] {
            let r = random_scalar(&mut OsRng);
            let commitment = pedersen::commit(&r, value).unwrap();
            let proof = prove_range(&r, value, &mut OsRng).unwrap();
            assert!(verify_range(&proof, &commitment), "value {value}");
        }
    }
}
