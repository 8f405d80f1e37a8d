//! Multi-asset Pedersen commitments: `C = r·G + Σ vᵢ·H_idᵢ`.
//!
//! Each asset gets its own NUMS generator derived from its identifier, so
//! values of different assets cannot be traded off against each other inside
//! one commitment. The generator table is an explicit value owned by the
//! caller, not a process-wide singleton, and is populated lazily
//! under a single-writer/multi-reader lock.
//!
//! These primitives back the private OTC swap extension; no pool-building
//! path invokes them.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::RwLock;

use rand::rngs::OsRng;

use crate::crypto::curve::{asset_generator, base_mul, Point, Scalar};
use crate::crypto::schnorr::{self, SchnorrProof};
use crate::error::{Error, Result};

/// An asset identifier (the chain's 32-byte token id).
pub type AssetId = Vec<u8>;

/// Lazily populated `asset_id -> H_id` table.
///
/// Readers share the lock; a miss upgrades to the write lock, re-checks, and
/// inserts. Entries are full points, never torn: the map is only ever read
/// or extended under the lock.
pub struct GeneratorTable {
    entries: RwLock<HashMap<AssetId, Point>>,
}

impl GeneratorTable {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Look up the generator for `asset_id`, deriving and caching it on miss.
    pub fn get(&self, asset_id: &[u8]) -> Point {
        if let Some(point) = self.entries.read().expect("generator table poisoned").get(asset_id) {
            return *point;
        }
        let derived = asset_generator(asset_id);
        let mut table = self.entries.write().expect("generator table poisoned");
        *table.entry(asset_id.to_vec()).or_insert(derived)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("generator table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GeneratorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A commitment over a set of assets, tagged with that set so the
/// homomorphic operations can enforce matching operands.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MultiAssetCommitment {
    pub point: Point,
    /// Sorted asset ids committed to (amounts stay private).
    pub assets: Vec<AssetId>,
}

/// Commit to a basket of `(asset_id, amount)` pairs.
pub fn commit(
    table: &GeneratorTable,
    r: &Scalar,
    amounts: &[(AssetId, u64)],
) -> Result<MultiAssetCommitment> {
    if amounts.is_empty() {
        return Err(Error::Commitment("empty asset basket".into()));
    }
    // Canonicalize through a map: duplicate ids are summed, order is fixed.
    let mut basket: BTreeMap<AssetId, u64> = BTreeMap::new();
    for (id, amount) in amounts {
        let entry = basket.entry(id.clone()).or_insert(0);
        *entry = entry
            .checked_add(*amount)
            .ok_or_else(|| Error::Commitment("asset amount overflow".into()))?;
    }

    let mut acc = base_mul(r)?;
    for (id, amount) in &basket {
        if *amount == 0 {
            continue;
        }
        let term = table.get(id).mul(&Scalar::from_u64(*amount))?;
        acc = acc.add(&term)?;
    }
    Ok(MultiAssetCommitment {
        point: acc,
        assets: basket.into_keys().collect(),
    })
}

/// Check that `(r, amounts)` opens `commitment`.
pub fn open(
    table: &GeneratorTable,
    commitment: &MultiAssetCommitment,
    r: &Scalar,
    amounts: &[(AssetId, u64)],
) -> bool {
    match commit(table, r, amounts) {
        Ok(recomputed) => recomputed == *commitment,
        Err(_) => false,
    }
}

fn require_same_assets(a: &MultiAssetCommitment, b: &MultiAssetCommitment) -> Result<()> {
    if a.assets != b.assets {
        return Err(Error::Commitment("mismatched asset sets".into()));
    }
    Ok(())
}

/// Homomorphic addition over commitments to the same asset set.
pub fn add(a: &MultiAssetCommitment, b: &MultiAssetCommitment) -> Result<MultiAssetCommitment> {
    require_same_assets(a, b)?;
    Ok(MultiAssetCommitment {
        point: a.point.add(&b.point).map_err(Error::Curve)?,
        assets: a.assets.clone(),
    })
}

/// Homomorphic subtraction over commitments to the same asset set.
pub fn sub(a: &MultiAssetCommitment, b: &MultiAssetCommitment) -> Result<MultiAssetCommitment> {
    require_same_assets(a, b)?;
    Ok(MultiAssetCommitment {
        point: a.point.sub(&b.point).map_err(Error::Curve)?,
        assets: a.assets.clone(),
    })
}

/// Prove that a multi-asset split conserves every asset.
///
/// If inputs and outputs carry the same per-asset totals, the residual
/// `Σ C_in − Σ C_out` is `Δr·G` with no generator component; the proof is a
/// Schnorr proof of knowledge of `Δr` on `G`, checkable on-chain.
pub fn prove_balance(
    input_blindings: &[Scalar],
    output_blindings: &[Scalar],
    residual: &Point,
    message: &[u8],
) -> Result<SchnorrProof> {
    let mut delta = Scalar::ZERO;
    for r in input_blindings {
        delta = delta.add(r);
    }
    for r in output_blindings {
        delta = delta.sub(r);
    }
    if delta.is_zero() {
        return Err(Error::Proof("balance residual witness is zero".into()));
    }
    let expected = base_mul(&delta)?;
    if expected != *residual {
        return Err(Error::Proof("balance residual has a generator-foreign component".into()));
    }
    schnorr::prove(&delta, residual, message, &mut OsRng)
}
