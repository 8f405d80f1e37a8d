//! Withdrawal processor: strictly one intent per transaction.
//!
//! The transaction-binding message is folded into the ring proof's
//! Fiat–Shamir challenge, so two independent withdrawal proofs cannot share
//! one challenge-sum equation, and therefore cannot share a transaction.
//! The processor consumes the pool head and exactly one intent, inserts the
//! nullifier into R5, and pays the denomination to the intent's payout
//! script. The ring bundle (built by the withdrawer's client) rides in
//! context-extension variable 0, the nullifier insert proof in variable 1.

use std::collections::BTreeMap;

use tracing::info;

use crate::crypto::curve::Point;
use crate::crypto::ring::reject_banned;
use crate::error::{Error, Result, ValidationError};
use crate::node::ChainToken;
use crate::state::pool::{PoolBox, WithdrawIntent};
use crate::tx::{TxDraft, INTENT_VALUE, MIN_FEE};

/// A built withdrawal sweep, ready for signing.
pub struct WithdrawalSweep {
    pub draft: TxDraft,
    pub nullifier: Point,
    pub insert_proof: Vec<u8>,
    pub payout_script: Vec<u8>,
}

pub struct WithdrawalProcessor {
    pool: PoolBox,
}

impl WithdrawalProcessor {
    pub fn new(pool: PoolBox) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PoolBox {
        &self.pool
    }

    /// Sweep-time re-validation of one intent.
    pub fn validate_intent(&self, intent: &WithdrawIntent) -> Result<()> {
        reject_banned(&intent.nullifier, "nullifier")?;
        if self.pool.nullifiers.contains(&intent.nullifier) {
            return Err(ValidationError::NullifierSpent.into());
        }
        if intent.payout_script.is_empty() {
            return Err(ValidationError::InvalidRecipient.into());
        }
        if intent.value < INTENT_VALUE {
            return Err(ValidationError::BadIntent {
                box_id: intent.box_id.clone(),
                reason: "does not fund the payout dust and sweep fee".into(),
            }
            .into());
        }
        if self.pool.token.amount < self.pool.denomination {
            return Err(Error::Resolution(format!(
                "pool {} cannot cover a withdrawal",
                self.pool.box_id
            )));
        }
        Ok(())
    }

    /// Build the sweep for exactly one intent. `ring_bundle` is the
    /// withdrawer's serialized witness from the proof layer.
    pub fn build_sweep(
        &self,
        intent: &WithdrawIntent,
        ring_bundle: Vec<u8>,
    ) -> Result<WithdrawalSweep> {
        self.validate_intent(intent)?;
        if ring_bundle.is_empty() {
            return Err(Error::Proof("empty ring bundle".into()));
        }

        let inserted = self.pool.nullifiers.insert(&intent.nullifier)?;

        let successor_token = ChainToken {
            token_id: self.pool.token.token_id.clone(),
            amount: self.pool.token.amount - self.pool.denomination,
        };
        let payout_token = ChainToken {
            token_id: self.pool.token.token_id.clone(),
            amount: self.pool.denomination,
        };

        let mut extension = BTreeMap::new();
        extension.insert(0u8, ring_bundle);
        extension.insert(1u8, inserted.proof.clone());

        let draft = TxDraft::new()
            .with_input(&self.pool.box_id, self.pool.raw_bytes.clone(), extension)
            .with_input(&intent.box_id, intent.raw_bytes.clone(), BTreeMap::new())
            .add_output(
                &self.pool.script,
                self.pool.value,
                vec![successor_token],
                self.pool.successor_registers(&self.pool.depositor_keys, &inserted.next),
            )
            .add_output(
                &hex::encode(&intent.payout_script),
                // Intent dust beyond the fee flows to the recipient, so the
                // native column stays conserved.
                intent.value - MIN_FEE,
                vec![payout_token],
                vec![],
            );

        info!(
            pool_id = %self.pool.box_id,
            nullifier = %intent.nullifier.encode_hex(),
            "withdrawal sweep built"
        );
        Ok(WithdrawalSweep {
            draft,
            nullifier: intent.nullifier,
            insert_proof: inserted.proof,
            payout_script: intent.payout_script.clone(),
        })
    }
}
