//! Relayer daemon configuration.
//!
//! A JSON file with serde defaults on every field, so a partial config
//! works; CLI flags override the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nightpool_core::SafetyConfig;

fn default_node_url() -> String {
    "http://127.0.0.1:9053".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_scan_limit() -> usize {
    50
}

/// One pool the daemon sequences.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Compiled pool contract script (hex).
    pub pool_script: String,
    /// Script guarding pending intent-to-deposit boxes.
    pub deposit_intent_script: String,
    /// Script guarding pending intent-to-withdraw boxes.
    pub withdraw_intent_script: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_node_url")]
    pub node_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    /// Directory where withdrawers spool their ring bundles, one
    /// `<nullifier_hex>.hex` file per pending withdrawal.
    #[serde(default)]
    pub bundle_dir: Option<String>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub safety: SafetyConfig,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            scan_limit: default_scan_limit(),
            bundle_dir: None,
            pools: Vec::new(),
            safety: SafetyConfig::default(),
        }
    }
}

impl RelayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"node_url": "http://node:9053"}}"#).unwrap();
        let config = RelayerConfig::load(file.path()).unwrap();
        assert_eq!(config.node_url, "http://node:9053");
        assert_eq!(config.timeout_secs, 15);
        assert!(config.pools.is_empty());
        assert!(!config.safety.dry_run);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(RelayerConfig::load(Path::new("/no/such/config.json")).is_err());
    }
}
