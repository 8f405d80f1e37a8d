//! Signer collaborator.
//!
//! The external signing service turns an unsigned draft plus hints into a
//! signed transaction. The core only shapes the hints: the discrete-log
//! secrets and the DH-tuple description `(g, h, u, v)` the prover needs to
//! produce the ring proof at signing time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroize;

use crate::error::Result;

/// One DH-tuple hint: knowledge of `secret` with `u = secret·g` and
/// `v = secret·h`.
#[derive(Clone, Serialize, Deserialize)]
pub struct DhtHint {
    pub secret: String,
    pub g: String,
    pub h: String,
    pub u: String,
    pub v: String,
}

impl Drop for DhtHint {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for DhtHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never reaches logs.
        f.debug_struct("DhtHint")
            .field("g", &self.g)
            .field("h", &self.h)
            .field("u", &self.u)
            .field("v", &self.v)
            .finish_non_exhaustive()
    }
}

/// Everything the signer needs beyond the unsigned transaction.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SigningHints {
    /// Plain discrete-log secrets (hex scalars).
    pub dlog: Vec<String>,
    /// DH-tuple secrets with their public images.
    pub dht: Vec<DhtHint>,
}

impl std::fmt::Debug for SigningHints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningHints")
            .field("dlog_count", &self.dlog.len())
            .field("dht", &self.dht)
            .finish()
    }
}

impl Drop for SigningHints {
    fn drop(&mut self) {
        for secret in &mut self.dlog {
            secret.zeroize();
        }
    }
}

/// The signing surface the core consumes.
pub trait TxSigner: Send + Sync {
    fn sign(&self, unsigned_tx: &Value, inputs_raw: &[String], hints: &SigningHints)
        -> Result<Value>;
}
