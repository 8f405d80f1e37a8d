//! Pedersen commitments: `C = r·G + v·H`.
//!
//! `H` is the NUMS secondary generator from the curve layer, so the scheme
//! is binding under the discrete-log assumption and perfectly hiding in the
//! blinding factor. Verification is `C - v·H == r·G`, which the on-chain
//! validator can check with a plain discrete-log proof.

use subtle::ConstantTimeEq;

use crate::crypto::curve::{base_mul, nums_h, Point, Scalar};
use crate::error::{CurveError, Error, Result};

/// A Pedersen commitment to a 64-bit value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Commitment(pub Point);

impl Commitment {
    pub fn as_point(&self) -> &Point {
        &self.0
    }

    pub fn encode_hex(&self) -> String {
        self.0.encode_hex()
    }
}

/// Commit to `value` under blinding factor `r`.
///
/// Never returns the identity: `r·G + v·H` collapsing to the identity would
/// require `r = -v·log_G(H)`, which no party can compute, so an identity
/// result is surfaced as a hard error rather than silently re-randomized.
pub fn commit(r: &Scalar, value: u64) -> Result<Commitment> {
    if r.is_zero() {
        return Err(CurveError::BadScalar.into());
    }
    let blind = base_mul(r)?;
    if value == 0 {
        return Ok(Commitment(blind));
    }
    let amount = nums_h().mul(&Scalar::from_u64(value))?;
    Ok(Commitment(blind.add(&amount)?))
}

/// Check that `(r, value)` opens `commitment`. Comparison is constant-time
/// over the compressed encodings.
pub fn open(commitment: &Commitment, r: &Scalar, value: u64) -> bool {
    if r.is_zero() {
        return false;
    }
    match commit(r, value) {
        Ok(recomputed) => {
            let lhs = recomputed.0.encode();
            let rhs = commitment.0.encode();
            bool::from(lhs.ct_eq(&rhs))
        }
        Err(_) => false,
    }
}

/// Homomorphic addition: `commit(r1, v1) + commit(r2, v2) = commit(r1+r2, v1+v2)`.
pub fn add(a: &Commitment, b: &Commitment) -> Result<Commitment> {
    a.0.add(&b.0)
        .map(Commitment)
        .map_err(|_| Error::Commitment("commitment sum is the identity".into()))
}

/// Homomorphic subtraction.
pub fn sub(a: &Commitment, b: &Commitment) -> Result<Commitment> {
    a.0.sub(&b.0)
        .map(Commitment)
        .map_err(|_| Error::Commitment("commitment difference is the identity".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::random_scalar;
    use rand::rngs::OsRng;

    #[test]
    fn open_accepts_correct_opening() {
        let r = random_scalar(&mut OsRng);
        let c = commit(&r, 100).unwrap();
        assert!(open(&c, &r, 100));
    }

    #[test]
    fn open_rejects_wrong_value() {
        let r = random_scalar(&mut OsRng);
        let c = commit(&r, 100).unwrap();
        assert!(!open(&c, &r, 101));
    }

    #[test]
    fn open_rejects_wrong_blinding() {
        let r = random_scalar(&mut OsRng);
        let other = random_scalar(&mut OsRng);
        let c = commit(&r, 100).unwrap();
        assert!(!open(&c, &other, 100));
    }

    #[test]
    fn commit_rejects_zero_blinding() {
        assert!(commit(&Scalar::ZERO, 5).is_err());
    }

    #[test]
    fn homomorphism() {
        let r1 = random_scalar(&mut OsRng);
        let r2 = random_scalar(&mut OsRng);
        let lhs = add(&commit(&r1, 30).unwrap(), &commit(&r2, 12).unwrap()).unwrap();
        let rhs = commit(&r1.add(&r2), 42).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn zero_value_commits_to_blinding_image() {
        let r = random_scalar(&mut OsRng);
        let c = commit(&r, 0).unwrap();
        assert_eq!(c.0, base_mul(&r).unwrap());
    }
}
