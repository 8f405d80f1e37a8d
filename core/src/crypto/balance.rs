//! Algebraic balance proofs for multi-output splits.
//!
//! Value conservation over Pedersen commitments: if the inputs and outputs
//! commit to the same total, the residual `Σ C_in − Σ C_out` carries no `H`
//! component and equals `Δr·G` for `Δr = Σ r_in − Σ r_out`. Knowledge of
//! `Δr` is shown with a Schnorr proof on `G`, which is exactly what the
//! on-chain validator can check natively.

use rand::{CryptoRng, RngCore};

use crate::crypto::curve::{base_mul, Point, Scalar};
use crate::crypto::pedersen::Commitment;
use crate::crypto::schnorr::{self, SchnorrProof};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug)]
pub struct BalanceProof {
    /// `Σ C_in − Σ C_out`.
    pub residual: Point,
    pub proof: SchnorrProof,
}

fn residual_point(inputs: &[Commitment], outputs: &[Commitment]) -> Result<Point> {
    let mut acc: Option<Point> = None;
    for input in inputs {
        acc = Some(match acc {
            None => input.0,
            Some(prev) => prev.add(&input.0)?,
        });
    }
    let mut sum = acc.ok_or_else(|| Error::Proof("no input commitments".into()))?;
    for output in outputs {
        sum = sum
            .sub(&output.0)
            .map_err(|_| Error::Proof("balance residual is the identity".into()))?;
    }
    Ok(sum)
}

/// Prove conservation for a split. The caller selects output blindings so
/// the residual is a pure `G`-multiple; a residual with an `H` component
/// means the committed totals differ, and proving fails.
pub fn prove_balance<R: RngCore + CryptoRng>(
    inputs: &[(Scalar, Commitment)],
    outputs: &[(Scalar, Commitment)],
    message: &[u8],
    rng: &mut R,
) -> Result<BalanceProof> {
    let mut delta = Scalar::ZERO;
    for (r, _) in inputs {
        delta = delta.add(r);
    }
    for (r, _) in outputs {
        delta = delta.sub(r);
    }
    if delta.is_zero() {
        return Err(Error::Proof("balance witness is zero; re-randomize an output".into()));
    }

    let input_points: Vec<Commitment> = inputs.iter().map(|(_, c)| *c).collect();
    let output_points: Vec<Commitment> = outputs.iter().map(|(_, c)| *c).collect();
    let residual = residual_point(&input_points, &output_points)?;

    if base_mul(&delta)? != residual {
        return Err(Error::Proof("balance residual has a non-zero H component".into()));
    }

    let proof = schnorr::prove(&delta, &residual, message, rng)?;
    Ok(BalanceProof { residual, proof })
}

/// Verify a balance proof against the public commitment lists.
pub fn verify_balance(
    proof: &BalanceProof,
    inputs: &[Commitment],
    outputs: &[Commitment],
    message: &[u8],
) -> bool {
    let residual = match residual_point(inputs, outputs) {
        Ok(point) => point,
        Err(_) => return false,
    };
    if residual != proof.residual {
        return false;
    }
    schnorr::verify(&proof.proof, &residual, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::curve::random_scalar;
    use crate::crypto::pedersen;
    use rand::rngs::OsRng;

    #[test]
    fn conserving_split_proves_and_verifies() {
        let r_in = random_scalar(&mut OsRng);
        let r_a = random_scalar(&mut OsRng);
        let r_b = random_scalar(&mut OsRng);
        let c_in = pedersen::commit(&r_in, 100).unwrap();
        let c_a = pedersen::commit(&r_a, 60).unwrap();
        let c_b = pedersen::commit(&r_b, 40).unwrap();

        let proof = prove_balance(
            &[(r_in, c_in)],
            &[(r_a, c_a), (r_b, c_b)],
            b"split",
            &mut OsRng,
        )
        .unwrap();
        assert!(verify_balance(&proof, &[c_in], &[c_a, c_b], b"split"));
    }

    #[test]
    fn inflating_split_fails_to_prove() {
        let r_in = random_scalar(&mut OsRng);
        let r_out = random_scalar(&mut OsRng);
        let c_in = pedersen::commit(&r_in, 100).unwrap();
        let c_out = pedersen::commit(&r_out, 101).unwrap();
        assert!(prove_balance(&[(r_in, c_in)], &[(r_out, c_out)], b"split", &mut OsRng).is_err());
    }

    #[test]
    fn verify_rejects_substituted_outputs() {
        let r_in = random_scalar(&mut OsRng);
        let r_out = random_scalar(&mut OsRng);
        let c_in = pedersen::commit(&r_in, 100).unwrap();
        let c_out = pedersen::commit(&r_out, 100).unwrap();
        let proof = prove_balance(&[(r_in, c_in)], &[(r_out, c_out)], b"m", &mut OsRng).unwrap();

        let c_other = pedersen::commit(&random_scalar(&mut OsRng), 100).unwrap();
        assert!(!verify_balance(&proof, &[c_in], &[c_other], b"m"));
    }
}
