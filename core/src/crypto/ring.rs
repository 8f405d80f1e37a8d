//! DH-tuple ring construction for withdrawals.
//!
//! The on-chain validator accepts a withdrawal when at least one ring index
//! `i` satisfies `proveDHTuple(G, H, C_i − denom·H, I)`. For the real index
//! `j` the target collapses to `T_j = r·G`, and the nullifier is `I = r·H`,
//! so both images share the one witness `r`. The off-chain builder simulates
//! every decoy index with a pre-chosen `(challenge, response)` pair and
//! leaves the real index's challenge as the residual of the Fiat–Shamir sum
//! equation.
//!
//! The nullifier base is the global `H`. Earlier protocol revisions let the
//! withdrawer pick a secondary generator `U`, which allowed one deposit to
//! emit unlinkable nullifiers; fixing `U := H` closed that hole.
//!
//! Because the transaction-binding message is folded into the challenge,
//! two independent withdrawals can never share one transaction; the
//! relayer processes withdrawals strictly one at a time.

use rand::{CryptoRng, RngCore};

use crate::crypto::curve::{base_mul, blake2b256, nums_h, random_scalar, Point, Scalar};
use crate::error::{Error, Result, ValidationError};

const CHALLENGE_DOMAIN: &[u8] = b"nightpool/ring/v1";

/// One ring member's transcript: the verifier equations are
/// `s·G == a + c·T` and `s·H == b + c·I`.
#[derive(Clone, Copy, Debug)]
pub struct MemberTranscript {
    pub challenge: Scalar,
    pub response: Scalar,
    /// `a = k·G` for the real index, `s·G − c·T` for decoys.
    pub commitment_g: Point,
    /// `b = k·H` for the real index, `s·H − c·I` for decoys.
    pub commitment_h: Point,
}

/// The assembled witness bundle for one withdrawal.
#[derive(Clone, Debug)]
pub struct RingWitness {
    /// The `R4` snapshot the proof was built against.
    pub ring: Vec<Point>,
    /// `T_i = C_i − denom·H`.
    pub targets: Vec<Point>,
    pub real_index: usize,
    /// `I = r·H`.
    pub nullifier: Point,
    pub members: Vec<MemberTranscript>,
}

/// `I = r·H`, the double-spend detector. Deterministic in `r`.
pub fn nullifier(secret: &Scalar) -> Result<Point> {
    let image = nums_h().mul(secret)?;
    reject_banned(&image, "nullifier")?;
    Ok(image)
}

/// Reject the two protocol constants wherever a user-influenced point lands
/// in pool state.
pub fn reject_banned(point: &Point, role: &'static str) -> Result<()> {
    if *point == Point::generator() || *point == nums_h() {
        return Err(ValidationError::BannedPoint { role }.into());
    }
    Ok(())
}

/// `acc + scalar·base`, tolerating a zero scalar (the term vanishes).
fn add_term(acc: &Point, base: &Point, scalar: &Scalar) -> Result<Point> {
    if scalar.is_zero() {
        return Ok(*acc);
    }
    Ok(acc.add(&base.mul(scalar)?)?)
}

fn fiat_shamir_sum(message: &[u8], members: &[MemberTranscript]) -> Scalar {
    let mut transcript: Vec<u8> = Vec::with_capacity(message.len() + members.len() * 66);
    transcript.extend_from_slice(message);
    for member in members {
        transcript.extend_from_slice(&member.commitment_g.encode());
        transcript.extend_from_slice(&member.commitment_h.encode());
    }
    Scalar::from_hash(&blake2b256(&[CHALLENGE_DOMAIN, &transcript]))
}

/// Build the witness bundle for a withdrawal from `ring[real_index]`.
///
/// `secret` is the deposit blinding factor `r` with
/// `ring[real_index] = r·G + denom·H`. `message` is the transaction-binding
/// message the signer will also present to the validator.
pub fn build_ring_witness<R: RngCore + CryptoRng>(
    ring: &[Point],
    real_index: usize,
    secret: &Scalar,
    denomination: u64,
    message: &[u8],
    rng: &mut R,
) -> Result<RingWitness> {
    if ring.is_empty() {
        return Err(Error::Proof("empty ring".into()));
    }
    if real_index >= ring.len() {
        return Err(Error::Proof(format!(
            "ring index {} out of range for ring of {}",
            real_index,
            ring.len()
        )));
    }

    let denom_h = nums_h().mul(&Scalar::from_u64(denomination))?;
    let targets: Vec<Point> = ring
        .iter()
        .map(|c| c.sub(&denom_h))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Proof("ring member equals the denomination point".into()))?;

    // The real target must be the witness image, or the secret does not
    // belong to this slot.
    let expected = base_mul(secret)?;
    if targets[real_index] != expected {
        return Err(Error::Proof("secret does not open the ring member at the real index".into()));
    }

    let image = nullifier(secret)?;
    let h = nums_h();

    // Simulate every decoy, commit honestly at the real index.
    let nonce = random_scalar(rng);
    let mut members: Vec<MemberTranscript> = Vec::with_capacity(ring.len());
    for (i, target) in targets.iter().enumerate() {
        if i == real_index {
            members.push(MemberTranscript {
                challenge: Scalar::ZERO, // residual, patched below
                response: Scalar::ZERO,
                commitment_g: base_mul(&nonce)?,
                commitment_h: h.mul(&nonce)?,
            });
        } else {
            let challenge = random_scalar(rng);
            let response = random_scalar(rng);
            let neg = challenge.negate();
            let commitment_g = add_term(&base_mul(&response)?, target, &neg)?;
            let commitment_h = add_term(&h.mul(&response)?, &image, &neg)?;
            members.push(MemberTranscript { challenge, response, commitment_g, commitment_h });
        }
    }

    // Σ challenge_i must equal the transcript hash; the real index absorbs
    // the residual.
    let total = fiat_shamir_sum(message, &members);
    let mut decoy_sum = Scalar::ZERO;
    for (i, member) in members.iter().enumerate() {
        if i != real_index {
            decoy_sum = decoy_sum.add(&member.challenge);
        }
    }
    let real_challenge = total.sub(&decoy_sum);
    members[real_index].challenge = real_challenge;
    members[real_index].response = nonce.add(&real_challenge.mul(secret));

    Ok(RingWitness {
        ring: ring.to_vec(),
        targets,
        real_index,
        nullifier: image,
        members,
    })
}

/// Check the witness against the same equations the on-chain script
/// enforces: the challenge sum and, per member, `s·G == a + c·T` and
/// `s·H == b + c·I`.
pub fn verify_ring_witness(witness: &RingWitness, denomination: u64, message: &[u8]) -> bool {
    let denom_h = match nums_h().mul(&Scalar::from_u64(denomination)) {
        Ok(point) => point,
        Err(_) => return false,
    };
    if witness.ring.len() != witness.members.len() {
        return false;
    }

    let total = fiat_shamir_sum(message, &witness.members);
    let mut sum = Scalar::ZERO;
    for member in &witness.members {
        sum = sum.add(&member.challenge);
    }
    if sum != total {
        return false;
    }

    let h = nums_h();
    for (commitment, member) in witness.ring.iter().zip(&witness.members) {
        let target = match commitment.sub(&denom_h) {
            Ok(point) => point,
            Err(_) => return false,
        };
        let check = |base: &Point, image: &Point, anchor: &Point| -> bool {
            if member.response.is_zero() {
                return false;
            }
            let lhs = match base.mul(&member.response) {
                Ok(point) => point,
                Err(_) => return false,
            };
            match add_term(anchor, image, &member.challenge) {
                Ok(rhs) => lhs == rhs,
                Err(_) => false,
            }
        };
        if !check(&Point::generator(), &target, &member.commitment_g) {
            return false;
        }
        if !check(&h, &witness.nullifier, &member.commitment_h) {
            return false;
        }
    }
    true
}

/// Serialize the bundle into the opaque byte array the pool input carries as
/// context-extension variable 0. Layout (contract wire version 1):
/// member count, then per member `challenge ‖ response ‖ a ‖ b`, then the
/// nullifier.
pub fn encode_ring_bundle(witness: &RingWitness) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + witness.members.len() * 130 + 33);
    out.push(witness.members.len() as u8);
    for member in &witness.members {
        out.extend_from_slice(&member.challenge.to_bytes());
        out.extend_from_slice(&member.response.to_bytes());
        out.extend_from_slice(&member.commitment_g.encode());
        out.extend_from_slice(&member.commitment_h.encode());
    }
    out.extend_from_slice(&witness.nullifier.encode());
    out
}
