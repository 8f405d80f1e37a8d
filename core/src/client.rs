//! Pool client: scanning, health assessment, and draft building.
//!
//! The client is synchronous and stateless between calls: every build reads
//! the live pool head, validates against it, and returns an inert draft.
//! Validation failures are fatal to the call; a missing or moved pool box is
//! a `Resolution` error the caller may retry; a full pool is `Capacity`.
//!
//! Pool liquidity lives in the denomination-token column; the box's native
//! value is the reserved minimum and never moves with deposits or
//! withdrawals.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use crate::crypto::curve::{base_mul, nums_h, random_scalar, Point, Scalar, SecretScalar};
use crate::crypto::pedersen::{self, Commitment};
use crate::crypto::ring::{self, RingWitness};
use crate::error::{Error, Result, ValidationError};
use crate::node::{ChainToken, NodeApi};
use crate::signer::{DhtHint, SigningHints};
use crate::state::pool::{NullifierState, PoolBox, MIN_BOX_VALUE};
use crate::state::registers::RegisterValue;
use crate::tx::{TxDraft, TxOutput};

/// How many pool boxes one scan pages through.
const SCAN_LIMIT: usize = 50;

/// A deposit secret. Losing the blinding factor is equivalent to burning
/// the deposit; the core hands it to the caller and never persists it.
pub struct DepositSecret {
    secret: SecretScalar,
    pub commitment: Point,
    pub denomination: u64,
    pub asset_id: String,
}

impl DepositSecret {
    pub fn new(secret: SecretScalar, denomination: u64, asset_id: &str) -> Result<Self> {
        let r = secret.to_scalar();
        let commitment = *pedersen::commit(&r, denomination)?.as_point();
        ring::reject_banned(&commitment, "stealth key")?;
        Ok(Self { secret, commitment, denomination, asset_id: asset_id.to_string() })
    }

    pub fn blinding_factor(&self) -> Scalar {
        self.secret.to_scalar()
    }
}

/// Selective-disclosure record: proves to an auditor that the commitment
/// opens to the denomination, without spending anything.
#[derive(Clone, Debug)]
pub struct ViewKey {
    pub blinding_factor_hex: String,
    pub commitment_hex: String,
    pub denomination: u64,
}

/// One scanned pool, summarized.
#[derive(Clone, Debug)]
pub struct PoolSummary {
    pub pool_id: String,
    pub denomination: u64,
    pub token_id: String,
    pub ring_size: usize,
    pub max_ring: u32,
    /// Observed spent count; `None` when R5 is tree-typed.
    pub nullifiers: Option<usize>,
    pub token_balance: u64,
    pub withdrawable: u64,
    pub slots_remaining: u32,
    pub is_full: bool,
}

/// Coarse privacy score for a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivacyScore {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl fmt::Display for PrivacyScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrivacyScore::Critical => "CRITICAL",
            PrivacyScore::Poor => "POOR",
            PrivacyScore::Fair => "FAIR",
            PrivacyScore::Good => "GOOD",
            PrivacyScore::Excellent => "EXCELLENT",
        })
    }
}

/// Structured risk indicators surfaced by the health evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RiskFlag {
    LowRingSize { ring_size: usize },
    /// Identical keys in R4 inflate the ring without adding anonymity.
    DuplicateKeys { count: usize },
    InflatedRing { reported: usize, unique: usize },
    LowLiquidity { withdrawable: u64, ring_size: usize },
    HighWithdrawalRatio { spent: usize, ring_size: usize },
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::LowRingSize { ring_size } => {
                write!(f, "LOW_RING_SIZE: ring of {ring_size} gives weak anonymity")
            }
            RiskFlag::DuplicateKeys { count } => {
                write!(f, "DUPLICATE_KEYS: {count} duplicate keys (possible ring poisoning)")
            }
            RiskFlag::InflatedRing { reported, unique } => {
                write!(f, "INFLATED_RING: reported ring={reported} but unique keys={unique}")
            }
            RiskFlag::LowLiquidity { withdrawable, ring_size } => write!(
                f,
                "LOW_LIQUIDITY: only {withdrawable} withdrawals possible with ring of {ring_size}"
            ),
            RiskFlag::HighWithdrawalRatio { spent, ring_size } => {
                write!(f, "HIGH_WITHDRAWAL_RATIO: {spent}/{ring_size} keys already withdrawn")
            }
        }
    }
}

/// Structured risk assessment of one pool.
#[derive(Clone, Debug)]
pub struct HealthReport {
    pub pool_id: String,
    pub ring_size: usize,
    pub effective_anonymity: usize,
    pub duplicate_keys: usize,
    pub nullifier_count: usize,
    pub token_balance: u64,
    pub denomination: u64,
    pub withdrawable: u64,
    pub risk_flags: Vec<RiskFlag>,
    pub score: PrivacyScore,
}

/// A finished withdrawal draft plus everything the signer needs.
pub struct WithdrawalDraft {
    pub draft: TxDraft,
    pub witness: RingWitness,
    pub hints: SigningHints,
    pub nullifier: Point,
}

pub struct PoolClient {
    node: Arc<dyn NodeApi>,
    /// Compiled pool contract script (hex) used to find live pools.
    pool_script: String,
}

impl PoolClient {
    pub fn new(node: Arc<dyn NodeApi>, pool_script: &str) -> Self {
        Self { node, pool_script: pool_script.to_string() }
    }

    fn resolve_pool(&self, pool_id: &str) -> Result<PoolBox> {
        let chain_box = self
            .node
            .get_box_by_id(pool_id)?
            .ok_or_else(|| Error::Resolution(format!("pool box {pool_id} not found or spent")))?;
        PoolBox::parse(&chain_box)
    }

    // ------------------------------------------------------------------
    // Scanning & analytics
    // ------------------------------------------------------------------

    /// Scan for live pools of the given denomination.
    pub fn list_pools(&self, denomination: u64) -> Result<Vec<PoolSummary>> {
        let boxes = self.node.get_boxes_by_script(&self.pool_script, SCAN_LIMIT)?;
        let mut pools = Vec::new();
        for chain_box in &boxes {
            let pool = match PoolBox::parse(chain_box) {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(box_id = %chain_box.box_id, error = %e, "skipping malformed pool box");
                    continue;
                }
            };
            if pool.denomination != denomination {
                continue;
            }
            pools.push(summarize(&pool));
        }
        debug!(count = pools.len(), denomination, "pool scan complete");
        Ok(pools)
    }

    /// Pick the deposit target: the largest non-full ring, ties broken by
    /// most slots remaining. `None` when every candidate is at capacity.
    pub fn select_best_pool(&self, denomination: u64) -> Result<Option<PoolSummary>> {
        let mut eligible: Vec<PoolSummary> = self
            .list_pools(denomination)?
            .into_iter()
            .filter(|pool| !pool.is_full)
            .collect();
        eligible.sort_by(|a, b| {
            (b.ring_size, b.slots_remaining).cmp(&(a.ring_size, a.slots_remaining))
        });
        Ok(eligible.into_iter().next())
    }

    /// Full risk assessment of one pool.
    pub fn evaluate_pool_health(&self, pool_id: &str) -> Result<HealthReport> {
        let pool = self.resolve_pool(pool_id)?;

        let ring_size = pool.ring_size();
        let mut unique = std::collections::HashSet::new();
        let mut duplicate_keys = 0usize;
        for key in &pool.depositor_keys {
            if !unique.insert(key.encode()) {
                duplicate_keys += 1;
            }
        }
        let effective_anonymity = unique.len();
        let nullifier_count = pool.nullifiers.count().unwrap_or(0);
        let withdrawable = pool.withdrawable();

        let mut risk_flags = Vec::new();
        if ring_size < 4 {
            risk_flags.push(RiskFlag::LowRingSize { ring_size });
        }
        if duplicate_keys > 0 {
            risk_flags.push(RiskFlag::DuplicateKeys { count: duplicate_keys });
        }
        if effective_anonymity < ring_size {
            risk_flags
                .push(RiskFlag::InflatedRing { reported: ring_size, unique: effective_anonymity });
        }
        if ring_size > 0 && withdrawable < ring_size as u64 {
            risk_flags.push(RiskFlag::LowLiquidity { withdrawable, ring_size });
        }
        if ring_size > 0 && nullifier_count * 2 > ring_size {
            risk_flags.push(RiskFlag::HighWithdrawalRatio { spent: nullifier_count, ring_size });
        }

        Ok(HealthReport {
            pool_id: pool_id.to_string(),
            ring_size,
            effective_anonymity,
            duplicate_keys,
            nullifier_count,
            token_balance: pool.token.amount,
            denomination: pool.denomination,
            withdrawable,
            score: privacy_score(effective_anonymity, &risk_flags),
            risk_flags,
        })
    }

    /// Thin status view: the summary of one resolved pool.
    pub fn get_pool_status(&self, pool_id: &str) -> Result<PoolSummary> {
        Ok(summarize(&self.resolve_pool(pool_id)?))
    }

    // ------------------------------------------------------------------
    // Deposit path
    // ------------------------------------------------------------------

    /// Sample a fresh deposit secret for a pool denomination. The stealth
    /// key placed into the ring is the commitment `r·G + denom·H`.
    pub fn create_deposit(&self, denomination: u64, asset_id: &str) -> Result<DepositSecret> {
        let r = random_scalar(&mut OsRng);
        DepositSecret::new(SecretScalar::from_scalar(&r), denomination, asset_id)
    }

    /// Build the direct deposit draft: consume the pool head, append the
    /// stealth key to R4, grow the token balance by one denomination. The
    /// caller funds the deposited tokens and the fee with their own inputs
    /// before signing.
    pub fn build_deposit(&self, pool_id: &str, stealth_key: &Point) -> Result<TxDraft> {
        ring::reject_banned(stealth_key, "stealth key")?;

        let pool = self.resolve_pool(pool_id)?;
        debug!(pool_id, ring = pool.ring_size(), "live pool head resolved");

        if pool.is_full() {
            return Err(Error::Capacity { used: pool.ring_size(), max: pool.max_ring });
        }
        if let Some(position) = pool.key_position(stealth_key) {
            return Err(ValidationError::DuplicateKey { position }.into());
        }

        let mut successor_keys = pool.depositor_keys.clone();
        successor_keys.push(*stealth_key);

        let successor_token = ChainToken {
            token_id: pool.token.token_id.clone(),
            amount: pool.token.amount + pool.denomination,
        };
        let draft = TxDraft::new()
            .with_input(&pool.box_id, pool.raw_bytes.clone(), BTreeMap::new())
            .add_output(
                &pool.script,
                pool.value,
                vec![successor_token],
                pool.successor_registers(&successor_keys, &pool.nullifiers),
            );

        info!(pool_id, ring = successor_keys.len(), "deposit draft built");
        Ok(draft)
    }

    /// Intent-box output for the relayer deposit path: one denomination of
    /// pool token under the intent script, commitment in R4.
    pub fn deposit_intent_output(&self, secret: &DepositSecret, intent_script: &str) -> TxOutput {
        TxOutput {
            script: intent_script.to_string(),
            value: crate::tx::INTENT_VALUE,
            tokens: vec![ChainToken {
                token_id: secret.asset_id.clone(),
                amount: secret.denomination,
            }],
            registers: vec![("R4".to_string(), RegisterValue::GroupElement(secret.commitment))],
        }
    }

    // ------------------------------------------------------------------
    // Withdrawal path
    // ------------------------------------------------------------------

    /// Build the withdrawal draft: ring witness, nullifier insert, payout.
    pub fn build_withdrawal(
        &self,
        pool_id: &str,
        secret: &DepositSecret,
        recipient_script: &[u8],
    ) -> Result<WithdrawalDraft> {
        if recipient_script.is_empty() {
            return Err(ValidationError::InvalidRecipient.into());
        }

        let pool = self.resolve_pool(pool_id)?;
        if pool.denomination != secret.denomination {
            return Err(ValidationError::DenominationMismatch {
                expected: pool.denomination,
                got: secret.denomination,
            }
            .into());
        }

        let r = secret.blinding_factor();
        let image = ring::nullifier(&r)?;
        if pool.nullifiers.contains(&image) {
            return Err(ValidationError::NullifierSpent.into());
        }

        let real_index = pool.key_position(&secret.commitment).ok_or_else(|| {
            Error::Proof("deposit commitment is not present in the pool ring".into())
        })?;

        if pool.token.amount < pool.denomination {
            return Err(Error::Resolution(format!(
                "pool {pool_id} has no liquidity left for a withdrawal"
            )));
        }

        // Successor state: R4 untouched, the image joins R5.
        let inserted = pool.nullifiers.insert(&image)?;

        let successor_token = ChainToken {
            token_id: pool.token.token_id.clone(),
            amount: pool.token.amount - pool.denomination,
        };
        let payout_token =
            ChainToken { token_id: pool.token.token_id.clone(), amount: pool.denomination };

        // The AVL proof (tree variant) rides in extension var 1. The ring
        // bundle is attached afterwards in var 0, so its challenge binds
        // the rest of the draft.
        let mut extension = BTreeMap::new();
        if let NullifierState::Tree(_) = pool.nullifiers {
            extension.insert(1u8, inserted.proof.clone());
        }

        let draft = TxDraft::new()
            .with_input(&pool.box_id, pool.raw_bytes.clone(), extension)
            .add_output(
                &pool.script,
                pool.value,
                vec![successor_token],
                pool.successor_registers(&pool.depositor_keys, &inserted.next),
            )
            .add_output(&hex::encode(recipient_script), MIN_BOX_VALUE, vec![payout_token], vec![]);

        let height = self.node.get_height()?;
        let message = draft.binding_message(height);
        let witness = ring::build_ring_witness(
            &pool.depositor_keys,
            real_index,
            &r,
            pool.denomination,
            &message,
            &mut OsRng,
        )?;

        let draft = draft.set_extension_var(0, 0, ring::encode_ring_bundle(&witness));

        let secret_hex = hex::encode(r.to_bytes());
        let hints = SigningHints {
            dlog: vec![secret_hex.clone()],
            dht: vec![DhtHint {
                secret: secret_hex,
                g: Point::generator().encode_hex(),
                h: nums_h().encode_hex(),
                u: base_mul(&r)?.encode_hex(),
                v: image.encode_hex(),
            }],
        };

        info!(pool_id, ring = pool.ring_size(), "withdrawal draft built");
        Ok(WithdrawalDraft { draft, witness, hints, nullifier: image })
    }

    /// Intent-box output for the relayer withdrawal path: nullifier in R4,
    /// payout script in R6.
    pub fn withdrawal_intent_output(
        &self,
        nullifier: &Point,
        payout_script: &[u8],
        intent_script: &str,
    ) -> Result<TxOutput> {
        ring::reject_banned(nullifier, "nullifier")?;
        if payout_script.is_empty() {
            return Err(ValidationError::InvalidRecipient.into());
        }
        Ok(TxOutput {
            script: intent_script.to_string(),
            value: crate::tx::INTENT_VALUE,
            tokens: vec![],
            registers: vec![
                ("R4".to_string(), RegisterValue::GroupElement(*nullifier)),
                ("R6".to_string(), RegisterValue::ByteColl(payout_script.to_vec())),
            ],
        })
    }

    // ------------------------------------------------------------------
    // View keys
    // ------------------------------------------------------------------

    /// Explicit selective disclosure of one deposit.
    pub fn export_view_key(secret: &DepositSecret) -> ViewKey {
        ViewKey {
            blinding_factor_hex: hex::encode(secret.blinding_factor().to_bytes()),
            commitment_hex: secret.commitment.encode_hex(),
            denomination: secret.denomination,
        }
    }

    /// Verify a disclosed view key.
    pub fn verify_view_key(commitment_hex: &str, blinding_factor_hex: &str, value: u64) -> bool {
        let Ok(point) = Point::decode_hex(commitment_hex) else {
            return false;
        };
        let Ok(bytes) = hex::decode(blinding_factor_hex) else {
            return false;
        };
        let Ok(bytes32) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let Ok(r) = Scalar::from_bytes(&bytes32) else {
            return false;
        };
        pedersen::open(&Commitment(point), &r, value)
    }
}

fn summarize(pool: &PoolBox) -> PoolSummary {
    PoolSummary {
        pool_id: pool.box_id.clone(),
        denomination: pool.denomination,
        token_id: pool.token.token_id.clone(),
        ring_size: pool.ring_size(),
        max_ring: pool.max_ring,
        nullifiers: pool.nullifiers.count(),
        token_balance: pool.token.amount,
        withdrawable: pool.withdrawable(),
        slots_remaining: pool.slots_remaining(),
        is_full: pool.is_full(),
    }
}

/// Ten points per unique depositor, minus deductions per risk class.
fn privacy_score(effective_anonymity: usize, risk_flags: &[RiskFlag]) -> PrivacyScore {
    let mut score = effective_anonymity as i64 * 10;
    for flag in risk_flags {
        score -= match flag {
            RiskFlag::LowRingSize { .. } => 30,
            RiskFlag::DuplicateKeys { .. } => 40,
            RiskFlag::InflatedRing { .. } => 20,
            RiskFlag::LowLiquidity { .. } => 10,
            RiskFlag::HighWithdrawalRatio { .. } => 15,
        };
    }
    match score {
        s if s >= 100 => PrivacyScore::Excellent,
        s if s >= 60 => PrivacyScore::Good,
        s if s >= 30 => PrivacyScore::Fair,
        s if s >= 10 => PrivacyScore::Poor,
        _ => PrivacyScore::Critical,
    }
}
