//! Pool relayer daemon.
//!
//! Sequences every configured pool: deposit intents are swept in batches,
//! withdrawals strictly one per transaction. One OS thread per pool, each
//! holding at most one in-flight transaction against its head.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nightpool_core::{HttpNode, SafetyPolicy};

mod config;
mod signer;
mod sweep;

use config::RelayerConfig;
use signer::WalletSigner;
use sweep::SweepWorker;

#[derive(Parser)]
#[command(name = "nightpool-relayer")]
#[command(version = "0.1.0")]
#[command(about = "Sweeps pool intents: batched deposits, sequential withdrawals")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "relayer.json")]
    config: PathBuf,

    /// Node REST URL (overrides the config file)
    #[arg(long)]
    node_url: Option<String>,

    /// Build drafts but never submit (overrides the config file)
    #[arg(long)]
    dry_run: bool,

    /// Run a single sweep cycle per pool and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = RelayerConfig::load(&cli.config)?;
    if let Some(node_url) = cli.node_url {
        config.node_url = node_url;
    }
    if cli.dry_run {
        config.safety.dry_run = true;
    }
    if config.pools.is_empty() {
        bail!("no pools configured; add at least one entry to `pools`");
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let node = Arc::new(
        HttpNode::new(&config.node_url, config.api_key.as_deref(), timeout)
            .context("node client construction failed")?,
    );
    let signer = Arc::new(
        WalletSigner::new(&config.node_url, config.api_key.as_deref(), timeout)
            .context("signer client construction failed")?,
    );
    let safety = Arc::new(SafetyPolicy::new(config.safety.clone()));
    let bundle_dir = config.bundle_dir.as_ref().map(PathBuf::from);
    let interval = Duration::from_secs(config.sweep_interval_secs);

    info!(
        pools = config.pools.len(),
        node = %config.node_url,
        dry_run = config.safety.dry_run,
        "relayer starting"
    );

    let mut handles = Vec::new();
    for pool_config in config.pools.clone() {
        let mut worker = SweepWorker::new(
            node.clone(),
            signer.clone(),
            safety.clone(),
            pool_config,
            config.scan_limit,
            bundle_dir.clone(),
        );
        let once = cli.once;
        handles.push(thread::spawn(move || {
            if once {
                if let Err(e) = worker.cycle() {
                    tracing::warn!(error = %e, "sweep cycle failed");
                }
            } else {
                worker.run(interval);
            }
        }));
    }

    for handle in handles {
        if handle.join().is_err() {
            bail!("a sweep worker panicked");
        }
    }
    Ok(())
}
