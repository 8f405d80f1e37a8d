//! Relayer sequencer: the two batchers that advance the canonical pool head.
//!
//! Deposits batch (no Sigma proof to share), withdrawals serialize (the
//! Fiat–Shamir challenge binds one transaction). Submission is the
//! linearization point: a rejected sweep leaves every intent untouched on
//! chain, and the next cycle re-reads the head and re-validates against
//! fresh state. Intents that keep failing validation are quarantined
//! (skipped, not spent) and left for the depositor's reclaim path.

pub mod deposit;
pub mod withdraw;

use std::collections::HashMap;

use tracing::warn;

use crate::state::pool::PoolBox;

pub use deposit::{DepositBatcher, DepositSweep, MAX_BATCH_SIZE};
pub use withdraw::{WithdrawalProcessor, WithdrawalSweep};

/// Validation failures tolerated before an intent is quarantined.
const QUARANTINE_THRESHOLD: u32 = 3;

/// The relayer's view of a pool head. Exactly one in-flight transaction per
/// head at a time; every transition replaces the head wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolHead {
    pub ring: usize,
    pub spent: usize,
    /// Token balance, the pool's liquidity column.
    pub balance: u64,
}

impl PoolHead {
    pub fn of(pool: &PoolBox) -> Self {
        Self {
            ring: pool.ring_size(),
            spent: pool.nullifiers.count().unwrap_or(0),
            balance: pool.token.amount,
        }
    }

    /// Head after a deposit batch of `k` intents.
    pub fn after_deposit_batch(self, k: usize, denomination: u64) -> Self {
        Self {
            ring: self.ring + k,
            spent: self.spent,
            balance: self.balance + denomination * k as u64,
        }
    }

    /// Head after one withdrawal.
    pub fn after_withdrawal(self, denomination: u64) -> Self {
        Self {
            ring: self.ring,
            spent: self.spent + 1,
            balance: self.balance.saturating_sub(denomination),
        }
    }

    /// Every depositor has withdrawn; the box may be retired.
    pub fn is_terminal(&self) -> bool {
        self.ring > 0 && self.spent >= self.ring
    }
}

/// Tracks intents whose validation keeps failing. Quarantined intents are
/// skipped by subsequent sweeps but never spent: the depositor keeps the
/// administrative reclaim path.
#[derive(Default)]
pub struct Quarantine {
    failures: HashMap<String, u32>,
}

impl Quarantine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a validation failure; returns true once the intent crosses
    /// the threshold.
    pub fn record_failure(&mut self, box_id: &str) -> bool {
        let count = self.failures.entry(box_id.to_string()).or_insert(0);
        *count += 1;
        if *count == QUARANTINE_THRESHOLD {
            warn!(box_id, "intent quarantined after repeated validation failures");
        }
        *count >= QUARANTINE_THRESHOLD
    }

    /// A later successful validation clears the record (the head may simply
    /// have been stale).
    pub fn clear(&mut self, box_id: &str) {
        self.failures.remove(box_id);
    }

    pub fn is_quarantined(&self, box_id: &str) -> bool {
        self.failures.get(box_id).is_some_and(|&count| count >= QUARANTINE_THRESHOLD)
    }
}
