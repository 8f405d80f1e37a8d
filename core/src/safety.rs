//! Safety gate for state-changing actions.
//!
//! Protects against runaway callers and misconfigured automation: hard
//! per-transaction and rolling daily caps, an hourly rate limit, a
//! destination allow-list, and a dry-run switch that builds drafts but never
//! submits. Privacy advisories (ring size, withdrawal delay) warn without
//! blocking. All rolling state sits behind one lock and is pruned on every
//! read, so it never outgrows a single window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::MIN_BOX_VALUE;

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

/// The address prefix of ordinary user keys on mainnet; payouts to plain
/// user wallets are always allowed.
const USER_KEY_PREFIX: char = '9';

fn default_max_per_tx() -> u64 {
    10_000_000_000
}
fn default_max_per_day() -> u64 {
    50_000_000_000
}
fn default_rate_per_hour() -> u32 {
    20
}
fn default_min_ring_size() -> u32 {
    4
}
fn default_min_withdrawal_delay_blocks() -> u32 {
    100
}
fn default_change_rounding_units() -> u64 {
    10_000_000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Hard cap per single transaction, in base units.
    #[serde(default = "default_max_per_tx")]
    pub max_per_tx: u64,
    /// Rolling 24-hour cap, in base units.
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u64,
    /// Allowed destinations: protocol labels or raw addresses. Empty means
    /// no restriction.
    #[serde(default)]
    pub allowed_destinations: Vec<String>,
    /// Max state-changing actions per rolling hour.
    #[serde(default = "default_rate_per_hour")]
    pub rate_per_hour: u32,
    /// Build drafts but never submit.
    #[serde(default)]
    pub dry_run: bool,
    /// Withdrawal advisory: warn below this ring size.
    #[serde(default = "default_min_ring_size")]
    pub min_ring_size: u32,
    /// Withdrawal advisory: minimum blocks between deposit and withdrawal.
    #[serde(default = "default_min_withdrawal_delay_blocks")]
    pub min_withdrawal_delay_blocks: u32,
    /// Granularity for deterministic change rounding.
    #[serde(default = "default_change_rounding_units")]
    pub change_rounding_units: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_per_tx: default_max_per_tx(),
            max_per_day: default_max_per_day(),
            allowed_destinations: Vec::new(),
            rate_per_hour: default_rate_per_hour(),
            dry_run: false,
            min_ring_size: default_min_ring_size(),
            min_withdrawal_delay_blocks: default_min_withdrawal_delay_blocks(),
            change_rounding_units: default_change_rounding_units(),
        }
    }
}

/// Point-in-time policy status.
#[derive(Clone, Debug, Serialize)]
pub struct SafetyStatus {
    pub daily_spent: u64,
    pub daily_remaining: u64,
    pub actions_last_hour: usize,
    pub actions_remaining_this_hour: u32,
    pub dry_run: bool,
}

/// Withdrawal-delay advice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayAdvice {
    pub safe: bool,
    pub blocks_remaining: u32,
}

#[derive(Default)]
struct RollingState {
    action_times: VecDeque<Instant>,
    spend_log: VecDeque<(Instant, u64)>,
}

impl RollingState {
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.action_times.front() {
            if now.duration_since(front) >= HOUR {
                self.action_times.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(front, _)) = self.spend_log.front() {
            if now.duration_since(front) >= DAY {
                self.spend_log.pop_front();
            } else {
                break;
            }
        }
    }

    fn daily_total(&self) -> u64 {
        self.spend_log.iter().map(|&(_, amount)| amount).sum()
    }
}

/// The policy gate. Cheap to share behind an `Arc`; all mutation happens
/// under the internal lock.
pub struct SafetyPolicy {
    config: SafetyConfig,
    state: Mutex<RollingState>,
}

impl SafetyPolicy {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config, state: Mutex::new(RollingState::default()) }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Validate a spend. Checks the per-tx cap, the rolling daily cap, and
    /// the destination allow-list.
    pub fn validate_send(&self, amount: u64, destination: &str) -> Result<()> {
        if amount > self.config.max_per_tx {
            return Err(Error::Safety(format!(
                "amount {amount} exceeds per-tx limit {}",
                self.config.max_per_tx
            )));
        }

        let daily = {
            let mut state = self.state.lock().expect("safety state poisoned");
            state.prune(Instant::now());
            state.daily_total()
        };
        if daily.saturating_add(amount) > self.config.max_per_day {
            return Err(Error::Safety(format!(
                "would exceed daily limit: {daily} + {amount} > {}",
                self.config.max_per_day
            )));
        }

        if !self.config.allowed_destinations.is_empty() && !self.destination_allowed(destination) {
            return Err(Error::Safety(format!(
                "destination '{destination}' is not in the allow-list"
            )));
        }
        Ok(())
    }

    fn destination_allowed(&self, destination: &str) -> bool {
        if destination.starts_with(USER_KEY_PREFIX) {
            return true;
        }
        let lowered = destination.to_lowercase();
        self.config
            .allowed_destinations
            .iter()
            .any(|allowed| *allowed == destination || lowered.contains(&allowed.to_lowercase()))
    }

    /// Enforce the hourly action rate.
    pub fn validate_rate_limit(&self) -> Result<()> {
        let mut state = self.state.lock().expect("safety state poisoned");
        state.prune(Instant::now());
        if state.action_times.len() >= self.config.rate_per_hour as usize {
            return Err(Error::Safety(format!(
                "rate limit exceeded: {} actions/hour",
                self.config.rate_per_hour
            )));
        }
        Ok(())
    }

    /// Record a completed state-changing action.
    pub fn record_action(&self, spent: u64) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("safety state poisoned");
        state.action_times.push_back(now);
        if spent > 0 {
            state.spend_log.push_back((now, spent));
        }
    }

    pub fn status(&self) -> SafetyStatus {
        let mut state = self.state.lock().expect("safety state poisoned");
        state.prune(Instant::now());
        let daily_spent = state.daily_total();
        SafetyStatus {
            daily_spent,
            daily_remaining: self.config.max_per_day.saturating_sub(daily_spent),
            actions_last_hour: state.action_times.len(),
            actions_remaining_this_hour: self
                .config
                .rate_per_hour
                .saturating_sub(state.action_times.len() as u32),
            dry_run: self.config.dry_run,
        }
    }

    /// How long until a withdrawal stops being trivially linkable to its
    /// deposit by timing alone.
    pub fn recommend_withdrawal_delay(
        &self,
        deposit_height: u32,
        current_height: u32,
    ) -> DelayAdvice {
        let elapsed = current_height.saturating_sub(deposit_height);
        let remaining = self.config.min_withdrawal_delay_blocks.saturating_sub(elapsed);
        DelayAdvice { safe: remaining == 0, blocks_remaining: remaining }
    }

    /// Advisory-only privacy checks for a pending withdrawal. Returns
    /// warnings; never errors.
    pub fn validate_privacy_withdrawal(
        &self,
        ring_size: u32,
        deposit_height: Option<u32>,
        current_height: u32,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        if ring_size < self.config.min_ring_size {
            warnings.push(format!(
                "LOW_ANONYMITY: ring size {ring_size} is below the advisory minimum {}",
                self.config.min_ring_size
            ));
        }
        if let Some(height) = deposit_height {
            let advice = self.recommend_withdrawal_delay(height, current_height);
            if !advice.safe {
                warnings.push(format!(
                    "TOO_SOON: wait {} more blocks before withdrawing",
                    advice.blocks_remaining
                ));
            }
        }
        warnings
    }

    /// Deterministic change: round down to the configured granularity so
    /// change amounts do not fingerprint the spender. Sub-minimum change
    /// collapses to the minimum box value; zero stays zero.
    pub fn compute_deterministic_change(&self, input: u64, output: u64, fee: u64) -> u64 {
        let raw = input.saturating_sub(output).saturating_sub(fee);
        if raw == 0 {
            return 0;
        }
        if raw < MIN_BOX_VALUE {
            return MIN_BOX_VALUE;
        }
        let units = self.config.change_rounding_units.max(1);
        let rounded = raw - raw % units;
        rounded.max(MIN_BOX_VALUE)
    }
}
