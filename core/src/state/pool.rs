//! Typed pool-protocol boxes.
//!
//! A raw [`ChainBox`] only becomes a [`PoolBox`], [`DepositIntent`], or
//! [`WithdrawIntent`] by passing a strict parse of its raw register bytes.
//! Anything that does not conform byte-for-byte is a `Serialization` error
//! at the boundary; malformed pool state never reaches the builders.

use tracing::debug;

use crate::avl::AvlProver;
use crate::crypto::curve::Point;
use crate::error::{Error, Result, ValidationError};
use crate::node::{ChainBox, ChainToken};
use crate::state::registers::{AvlTreeData, RegisterValue};

/// Minimum native value a box may carry without being rejected as dust.
pub const MIN_BOX_VALUE: u64 = 1_000_000;

/// The nullifier register: either a plain collection of spent images or an
/// authenticated tree digest. The two encodings never substitute for each
/// other: a pool created with one keeps it for life.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NullifierState {
    List(Vec<Point>),
    Tree(AvlTreeData),
}

/// Result of advancing a nullifier state by one image.
pub struct NullifierInsert {
    pub next: NullifierState,
    /// AVL insert witness for the tree variant; empty for the list variant,
    /// whose successor register is self-authenticating.
    pub proof: Vec<u8>,
}

impl NullifierState {
    pub fn parse(register: &RegisterValue) -> Result<Self> {
        match register {
            RegisterValue::PointColl(points) => Ok(NullifierState::List(points.clone())),
            RegisterValue::AvlTree(tree) => Ok(NullifierState::Tree(*tree)),
            other => Err(Error::Serialization(format!(
                "nullifier register has unsupported type: {other:?}"
            ))),
        }
    }

    pub fn to_register(&self) -> RegisterValue {
        match self {
            NullifierState::List(points) => RegisterValue::PointColl(points.clone()),
            NullifierState::Tree(tree) => RegisterValue::AvlTree(*tree),
        }
    }

    /// Spent-image membership. The list variant scans; the tree variant
    /// cannot be checked against the digest alone, so the answer is
    /// pessimistic-pass and the validator's insert-only semantics catch the
    /// duplicate at signing time.
    pub fn contains(&self, image: &Point) -> bool {
        match self {
            NullifierState::List(points) => points.contains(image),
            NullifierState::Tree(_) => {
                debug!("nullifier register is tree-typed; double-spend check deferred to the validator");
                false
            }
        }
    }

    /// Observed spent count (`None` when only the digest is known).
    pub fn count(&self) -> Option<usize> {
        match self {
            NullifierState::List(points) => Some(points.len()),
            NullifierState::Tree(_) => None,
        }
    }

    /// Insert one image, producing the successor state and its witness.
    pub fn insert(&self, image: &Point) -> Result<NullifierInsert> {
        match self {
            NullifierState::List(points) => {
                if points.contains(image) {
                    return Err(ValidationError::NullifierSpent.into());
                }
                let mut next = points.clone();
                next.push(*image);
                Ok(NullifierInsert { next: NullifierState::List(next), proof: Vec::new() })
            }
            NullifierState::Tree(tree) => {
                let mut prover = AvlProver::from_digest(tree.digest);
                prover.insert(image.encode())?;
                let (proof, digest) = prover.generate_proof();
                Ok(NullifierInsert {
                    next: NullifierState::Tree(AvlTreeData { digest, ..*tree }),
                    proof,
                })
            }
        }
    }
}

/// The on-chain pool state cell.
#[derive(Clone, Debug)]
pub struct PoolBox {
    pub box_id: String,
    pub value: u64,
    pub token: ChainToken,
    /// R4: ordered depositor keys, the anonymity set.
    pub depositor_keys: Vec<Point>,
    /// R5: spent nullifiers.
    pub nullifiers: NullifierState,
    /// R6: the fixed denomination, immutable after creation.
    pub denomination: u64,
    /// R7: ring capacity, immutable after creation.
    pub max_ring: u32,
    pub script: String,
    pub creation_height: u32,
    pub raw_bytes: Option<String>,
}

fn required_register(chain_box: &ChainBox, name: &str) -> Result<RegisterValue> {
    let raw = chain_box
        .register(name)
        .ok_or_else(|| Error::Serialization(format!("pool box is missing {name}")))?;
    RegisterValue::decode_hex(raw)
}

impl PoolBox {
    pub fn parse(chain_box: &ChainBox) -> Result<Self> {
        let depositor_keys = match required_register(chain_box, "R4")? {
            RegisterValue::PointColl(points) => points,
            other => {
                return Err(Error::Serialization(format!(
                    "R4 must be a point collection, got {other:?}"
                )))
            }
        };
        let nullifiers = NullifierState::parse(&required_register(chain_box, "R5")?)?;
        let denomination = match required_register(chain_box, "R6")? {
            RegisterValue::Long(v) if v > 0 => v as u64,
            other => {
                return Err(Error::Serialization(format!(
                    "R6 must be a positive long, got {other:?}"
                )))
            }
        };
        let max_ring = match required_register(chain_box, "R7")? {
            RegisterValue::Int(v) if v > 0 => v as u32,
            other => {
                return Err(Error::Serialization(format!(
                    "R7 must be a positive int, got {other:?}"
                )))
            }
        };
        let token = chain_box
            .assets
            .first()
            .cloned()
            .ok_or_else(|| Error::Serialization("pool box carries no denomination token".into()))?;

        Ok(PoolBox {
            box_id: chain_box.box_id.clone(),
            value: chain_box.value,
            token,
            depositor_keys,
            nullifiers,
            denomination,
            max_ring,
            script: chain_box.ergo_tree.clone(),
            creation_height: chain_box.creation_height,
            raw_bytes: chain_box.bytes.clone(),
        })
    }

    pub fn ring_size(&self) -> usize {
        self.depositor_keys.len()
    }

    pub fn slots_remaining(&self) -> u32 {
        (self.max_ring as usize).saturating_sub(self.ring_size()) as u32
    }

    pub fn is_full(&self) -> bool {
        self.ring_size() >= self.max_ring as usize
    }

    /// Settled operations the pool can still pay out.
    pub fn withdrawable(&self) -> u64 {
        self.token.amount / self.denomination
    }

    /// Position of `key` in the ring, if present.
    pub fn key_position(&self, key: &Point) -> Option<usize> {
        self.depositor_keys.iter().position(|k| k == key)
    }

    /// Successor registers with the given R4/R5 and the immutable R6/R7
    /// carried over.
    pub fn successor_registers(
        &self,
        depositor_keys: &[Point],
        nullifiers: &NullifierState,
    ) -> Vec<(String, RegisterValue)> {
        vec![
            ("R4".to_string(), RegisterValue::PointColl(depositor_keys.to_vec())),
            ("R5".to_string(), nullifiers.to_register()),
            ("R6".to_string(), RegisterValue::Long(self.denomination as i64)),
            ("R7".to_string(), RegisterValue::Int(self.max_ring as i32)),
        ]
    }
}

/// A pending intent-to-deposit box: one denomination plus the depositor's
/// commitment in R4, waiting for the relayer to sweep it into the pool.
#[derive(Clone, Debug)]
pub struct DepositIntent {
    pub box_id: String,
    pub value: u64,
    pub commitment: Point,
    pub token: Option<ChainToken>,
    pub script: String,
    pub raw_bytes: Option<String>,
}

impl DepositIntent {
    pub fn parse(chain_box: &ChainBox) -> Result<Self> {
        let commitment = match required_register(chain_box, "R4")? {
            RegisterValue::GroupElement(point) => point,
            other => {
                return Err(Error::Serialization(format!(
                    "deposit intent R4 must be a group element, got {other:?}"
                )))
            }
        };
        Ok(DepositIntent {
            box_id: chain_box.box_id.clone(),
            value: chain_box.value,
            commitment,
            token: chain_box.assets.first().cloned(),
            script: chain_box.ergo_tree.clone(),
            raw_bytes: chain_box.bytes.clone(),
        })
    }
}

/// A pending intent-to-withdraw box: the nullifier in R4 and the payout
/// script in R6. No secondary generator: the nullifier base is fixed to
/// the protocol's `H`.
#[derive(Clone, Debug)]
pub struct WithdrawIntent {
    pub box_id: String,
    pub value: u64,
    pub nullifier: Point,
    pub payout_script: Vec<u8>,
    pub script: String,
    pub raw_bytes: Option<String>,
}

impl WithdrawIntent {
    pub fn parse(chain_box: &ChainBox) -> Result<Self> {
        let nullifier = match required_register(chain_box, "R4")? {
            RegisterValue::GroupElement(point) => point,
            other => {
                return Err(Error::Serialization(format!(
                    "withdraw intent R4 must be a group element, got {other:?}"
                )))
            }
        };
        let payout_script = match required_register(chain_box, "R6")? {
            RegisterValue::ByteColl(bytes) => bytes,
            other => {
                return Err(Error::Serialization(format!(
                    "withdraw intent R6 must be a byte collection, got {other:?}"
                )))
            }
        };
        if chain_box.register("R5").is_some() {
            return Err(Error::Serialization(
                "withdraw intent carries a deprecated secondary generator in R5".into(),
            ));
        }
        Ok(WithdrawIntent {
            box_id: chain_box.box_id.clone(),
            value: chain_box.value,
            nullifier,
            payout_script,
            script: chain_box.ergo_tree.clone(),
            raw_bytes: chain_box.bytes.clone(),
        })
    }
}
