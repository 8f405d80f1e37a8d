//! Privacy-pool protocol client.
//!
//! Users deposit a fixed denomination into a shared pool and later withdraw
//! to an arbitrary recipient; a DH-tuple ring signature over the pool's
//! depositor keys unlinks the two. This crate is the off-chain side of the
//! protocol:
//!
//! - [`crypto`]: secp256k1 curve layer, Pedersen commitments, ring/range/
//!   balance proofs, nullifiers
//! - [`state`]: typed pool and intent boxes with canonical register
//!   serialization
//! - [`avl`]: the authenticated insert-only tree behind the nullifier and
//!   deposit digests
//! - [`client`]: scanning, pool health, deposit and withdrawal drafts
//! - [`relayer`]: the deposit batcher and the strictly sequential
//!   withdrawal processor
//! - [`safety`]: spending caps, rate limits, and privacy advisories
//! - [`node`] / [`signer`]: the external collaborators, as traits
//!
//! The crate persists nothing. Deposit secrets belong to the user; relayer
//! state is derived from the chain on every run.

pub mod avl;
pub mod client;
pub mod crypto;
pub mod error;
pub mod node;
pub mod relayer;
pub mod safety;
pub mod signer;
pub mod state;
pub mod tx;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod fuzz_tests;

pub use client::{
    DepositSecret, HealthReport, PoolClient, PoolSummary, PrivacyScore, RiskFlag, ViewKey,
    WithdrawalDraft,
};
pub use error::{CurveError, Error, Result, ValidationError};
pub use node::{ChainBox, ChainToken, HttpNode, NodeApi};
pub use relayer::{DepositBatcher, PoolHead, Quarantine, WithdrawalProcessor, MAX_BATCH_SIZE};
pub use safety::{SafetyConfig, SafetyPolicy};
pub use signer::{DhtHint, SigningHints, TxSigner};
pub use state::{DepositIntent, NullifierState, PoolBox, WithdrawIntent};
pub use tx::TxDraft;
