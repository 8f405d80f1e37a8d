//! Deposit batcher: sweeps pending intent-to-deposit boxes into the pool.
//!
//! One transaction consumes the pool head plus up to [`MAX_BATCH_SIZE`]
//! intents and produces the successor pool box with every commitment
//! appended to R4 and the token balance grown by one denomination per
//! intent. The pool input carries the aggregated AVL insert witness in
//! context-extension variable 0. Deposits carry no Sigma proof, which is
//! why they batch while withdrawals cannot.

use std::collections::BTreeMap;
use std::collections::HashSet;

use tracing::{debug, info};

use crate::avl::{AvlProver, AvlTree};
use crate::crypto::curve::Point;
use crate::crypto::ring::reject_banned;
use crate::error::{Error, Result, ValidationError};
use crate::node::ChainToken;
use crate::state::pool::{DepositIntent, PoolBox, MIN_BOX_VALUE};
use crate::tx::{TxDraft, MIN_FEE};

/// Most intents one sweep transaction may consume.
pub const MAX_BATCH_SIZE: usize = 50;

/// A built deposit sweep, ready for signing.
pub struct DepositSweep {
    pub draft: TxDraft,
    pub batch_size: usize,
    pub commitments: Vec<Point>,
    pub avl_proof: Vec<u8>,
    /// Ring size of the successor pool box.
    pub successor_ring: usize,
}

pub struct DepositBatcher {
    pool: PoolBox,
}

impl DepositBatcher {
    pub fn new(pool: PoolBox) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PoolBox {
        &self.pool
    }

    /// Sweep-time re-validation of one intent. Every check a depositor's
    /// client already ran is repeated here, because intents are
    /// permissionless and the pool head may have moved since they were
    /// created.
    pub fn validate_intent(&self, intent: &DepositIntent) -> Result<()> {
        let fail = |reason: &str| -> Error {
            ValidationError::BadIntent { box_id: intent.box_id.clone(), reason: reason.into() }
                .into()
        };

        if intent.value < MIN_BOX_VALUE {
            return Err(fail("below minimum box value"));
        }
        let token = intent.token.as_ref().ok_or_else(|| fail("carries no pool token"))?;
        if token.token_id != self.pool.token.token_id {
            return Err(fail("wrong token id"));
        }
        if token.amount != self.pool.denomination {
            return Err(Error::Validation(ValidationError::DenominationMismatch {
                expected: self.pool.denomination,
                got: token.amount,
            }));
        }
        reject_banned(&intent.commitment, "deposit commitment")?;
        if let Some(position) = self.pool.key_position(&intent.commitment) {
            return Err(ValidationError::DuplicateKey { position }.into());
        }
        Ok(())
    }

    /// Build the batch sweep transaction for the given intents.
    pub fn build_batch(&self, intents: &[DepositIntent]) -> Result<DepositSweep> {
        if intents.is_empty() {
            return Err(Error::Validation(ValidationError::BadIntent {
                box_id: String::new(),
                reason: "no intent boxes provided".into(),
            }));
        }
        if intents.len() > MAX_BATCH_SIZE {
            return Err(Error::Validation(ValidationError::BadIntent {
                box_id: String::new(),
                reason: format!("batch of {} exceeds {MAX_BATCH_SIZE}", intents.len()),
            }));
        }
        if self.pool.ring_size() + intents.len() > self.pool.max_ring as usize {
            return Err(Error::Capacity {
                used: self.pool.ring_size(),
                max: self.pool.max_ring,
            });
        }

        let mut seen: HashSet<[u8; 33]> = HashSet::new();
        for intent in intents {
            self.validate_intent(intent)?;
            if !seen.insert(intent.commitment.encode()) {
                return Err(ValidationError::BadIntent {
                    box_id: intent.box_id.clone(),
                    reason: "duplicate commitment within batch".into(),
                }
                .into());
            }
        }

        let commitments: Vec<Point> = intents.iter().map(|intent| intent.commitment).collect();

        // Aggregated insert witness, anchored on the current ring digest.
        let ring_digest = AvlTree::from_keys(self.pool.depositor_keys.iter().map(Point::encode))?
            .digest();
        let mut prover = AvlProver::from_digest(ring_digest);
        for commitment in &commitments {
            prover.insert(commitment.encode())?;
        }
        let (avl_proof, _) = prover.generate_proof();
        debug!(batch = intents.len(), proof_len = avl_proof.len(), "aggregated insert proof");

        let mut successor_keys = self.pool.depositor_keys.clone();
        successor_keys.extend_from_slice(&commitments);

        let successor_token = ChainToken {
            token_id: self.pool.token.token_id.clone(),
            amount: self.pool.token.amount
                + self.pool.denomination * intents.len() as u64,
        };
        // Intent dust above the miner fee is absorbed into the reserve, so
        // native value stays conserved.
        let intent_value: u64 = intents.iter().map(|intent| intent.value).sum();
        let successor_value = (self.pool.value + intent_value).saturating_sub(MIN_FEE);

        let mut extension = BTreeMap::new();
        extension.insert(0u8, avl_proof.clone());

        let mut draft = TxDraft::new()
            .with_input(&self.pool.box_id, self.pool.raw_bytes.clone(), extension);
        for intent in intents {
            draft = draft.with_input(&intent.box_id, intent.raw_bytes.clone(), BTreeMap::new());
        }
        let draft = draft.add_output(
            &self.pool.script,
            successor_value,
            vec![successor_token],
            self.pool.successor_registers(&successor_keys, &self.pool.nullifiers),
        );

        info!(
            pool_id = %self.pool.box_id,
            batch = intents.len(),
            ring = successor_keys.len(),
            "deposit sweep built"
        );
        Ok(DepositSweep {
            draft,
            batch_size: intents.len(),
            commitments,
            avl_proof,
            successor_ring: successor_keys.len(),
        })
    }
}
