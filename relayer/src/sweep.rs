//! The per-pool sweep worker.
//!
//! Each cycle re-reads the pool head from the chain, re-validates pending
//! intents against that fresh state, and advances the head with at most one
//! transaction: a deposit batch if any deposits are pending, otherwise a
//! single withdrawal. A rejected submission leaves everything on chain and
//! the next cycle starts over. The chain, not the worker, is the source of
//! truth.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use nightpool_core::error::{Error, Result};
use nightpool_core::relayer::{DepositBatcher, Quarantine, WithdrawalProcessor, MAX_BATCH_SIZE};
use nightpool_core::state::pool::{DepositIntent, PoolBox, WithdrawIntent};
use nightpool_core::tx::TxDraft;
use nightpool_core::{NodeApi, PoolHead, SafetyPolicy, SigningHints, TxSigner};

use crate::config::PoolConfig;

pub struct SweepWorker {
    node: Arc<dyn NodeApi>,
    signer: Arc<dyn TxSigner>,
    safety: Arc<SafetyPolicy>,
    pool_config: PoolConfig,
    scan_limit: usize,
    bundle_dir: Option<PathBuf>,
    quarantine: Quarantine,
}

impl SweepWorker {
    pub fn new(
        node: Arc<dyn NodeApi>,
        signer: Arc<dyn TxSigner>,
        safety: Arc<SafetyPolicy>,
        pool_config: PoolConfig,
        scan_limit: usize,
        bundle_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            node,
            signer,
            safety,
            pool_config,
            scan_limit,
            bundle_dir,
            quarantine: Quarantine::new(),
        }
    }

    /// Run forever at the configured cadence.
    pub fn run(mut self, interval: Duration) {
        loop {
            if let Err(e) = self.cycle() {
                if e.is_recoverable() {
                    warn!(error = %e, "sweep cycle failed; retrying against the next head");
                } else {
                    warn!(error = %e, "sweep cycle failed");
                }
            }
            thread::sleep(interval);
        }
    }

    /// One sweep cycle: at most one state-advancing transaction per head.
    pub fn cycle(&mut self) -> Result<()> {
        let head_box = self
            .node
            .get_boxes_by_script(&self.pool_config.pool_script, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Resolution("no live pool box for the configured script".into()))?;
        let pool = PoolBox::parse(&head_box)?;
        let head = PoolHead::of(&pool);
        debug!(pool_id = %pool.box_id, ?head, "pool head resolved");

        if head.is_terminal() {
            info!(pool_id = %pool.box_id, "pool is terminal (every depositor has withdrawn)");
            return Ok(());
        }

        if self.sweep_deposits(&pool)? {
            // One in-flight transaction per head: withdrawals wait for the
            // successor box.
            return Ok(());
        }
        self.sweep_withdrawal(&pool)?;
        Ok(())
    }

    fn sweep_deposits(&mut self, pool: &PoolBox) -> Result<bool> {
        let slots = pool.slots_remaining() as usize;
        if slots == 0 {
            return Ok(false);
        }
        let boxes =
            self.node.get_boxes_by_script(&self.pool_config.deposit_intent_script, self.scan_limit)?;
        let batcher = DepositBatcher::new(pool.clone());
        let batch_cap = MAX_BATCH_SIZE.min(slots);

        let mut batch: Vec<DepositIntent> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for chain_box in &boxes {
            if self.quarantine.is_quarantined(&chain_box.box_id) {
                continue;
            }
            let intent = match DepositIntent::parse(chain_box) {
                Ok(intent) => intent,
                Err(e) => {
                    debug!(box_id = %chain_box.box_id, error = %e, "unparseable deposit intent");
                    self.quarantine.record_failure(&chain_box.box_id);
                    continue;
                }
            };
            if !seen.insert(intent.commitment.encode()) {
                // Same commitment twice in one batch; the second sweeps later.
                continue;
            }
            match batcher.validate_intent(&intent) {
                Ok(()) => {
                    self.quarantine.clear(&intent.box_id);
                    batch.push(intent);
                    if batch.len() == batch_cap {
                        break;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    debug!(box_id = %intent.box_id, error = %e, "intent deferred");
                }
                Err(e) => {
                    debug!(box_id = %intent.box_id, error = %e, "intent failed validation");
                    self.quarantine.record_failure(&intent.box_id);
                }
            }
        }
        if batch.is_empty() {
            return Ok(false);
        }

        let sweep = batcher.build_batch(&batch)?;
        let spent = pool.denomination * sweep.batch_size as u64;
        let submitted = self.sign_and_submit(
            &sweep.draft,
            &SigningHints::default(),
            spent,
            &pool.script,
        )?;
        if submitted {
            info!(batch = sweep.batch_size, ring = sweep.successor_ring, "deposit sweep submitted");
        }
        Ok(submitted)
    }

    fn sweep_withdrawal(&mut self, pool: &PoolBox) -> Result<bool> {
        let boxes = self
            .node
            .get_boxes_by_script(&self.pool_config.withdraw_intent_script, self.scan_limit)?;
        let processor = WithdrawalProcessor::new(pool.clone());

        for chain_box in &boxes {
            if self.quarantine.is_quarantined(&chain_box.box_id) {
                continue;
            }
            let intent = match WithdrawIntent::parse(chain_box) {
                Ok(intent) => intent,
                Err(e) => {
                    debug!(box_id = %chain_box.box_id, error = %e, "unparseable withdraw intent");
                    self.quarantine.record_failure(&chain_box.box_id);
                    continue;
                }
            };
            if let Err(e) = processor.validate_intent(&intent) {
                if !e.is_recoverable() {
                    self.quarantine.record_failure(&intent.box_id);
                }
                debug!(box_id = %intent.box_id, error = %e, "withdraw intent not sweepable");
                continue;
            }
            let Some(bundle) = self.load_bundle(&intent) else {
                debug!(box_id = %intent.box_id, "no ring bundle spooled yet");
                continue;
            };

            self.quarantine.clear(&intent.box_id);
            let sweep = processor.build_sweep(&intent, bundle)?;
            let destination = hex::encode(&sweep.payout_script);
            let submitted = self.sign_and_submit(
                &sweep.draft,
                &SigningHints::default(),
                pool.denomination,
                &destination,
            )?;
            if submitted {
                info!(nullifier = %sweep.nullifier.encode_hex(), "withdrawal submitted");
            }
            // Strictly one withdrawal per transaction, one transaction per
            // cycle.
            return Ok(submitted);
        }
        Ok(false)
    }

    /// The withdrawer spools the serialized ring witness out-of-band, keyed
    /// by the nullifier.
    fn load_bundle(&self, intent: &WithdrawIntent) -> Option<Vec<u8>> {
        let dir = self.bundle_dir.as_ref()?;
        let path = dir.join(format!("{}.hex", intent.nullifier.encode_hex()));
        let raw = std::fs::read_to_string(path).ok()?;
        hex::decode(raw.trim()).ok()
    }

    /// Safety gate, sign, submit. Returns false when the draft was held
    /// back (dry run) and surfaces submit rejection as an error without
    /// marking anything spent.
    fn sign_and_submit(
        &self,
        draft: &TxDraft,
        hints: &SigningHints,
        spent: u64,
        destination: &str,
    ) -> Result<bool> {
        self.safety.validate_rate_limit()?;
        self.safety.validate_send(spent, destination)?;

        if self.safety.dry_run() {
            info!("dry run: draft built, not submitted");
            return Ok(false);
        }

        let height = self.node.get_height()?;
        let unsigned = draft.to_unsigned_json(height);
        let signed = self.signer.sign(&unsigned, &draft.inputs_raw(), hints)?;
        match self.node.submit(&signed) {
            Ok(tx_id) => {
                self.safety.record_action(spent);
                info!(tx_id, "transaction accepted");
                Ok(true)
            }
            Err(e) => {
                // SweepRejected: nothing is marked spent; the next cycle
                // re-reads the head and re-validates.
                warn!(error = %e, "sweep rejected by the node");
                Err(e)
            }
        }
    }
}
