//! CLI harness for running the sync engine against a live lightwalletd
//!
//! - `info`: server version and chain heights
//! - `sync`: stream from a checkpoint to the tip with a height-tracking wallet
//! - `broadcast`: relay a hex-encoded raw transaction

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lightsync_lightd::proto_types;
use lightsync_lightd::{
    shared, BuildTransaction, LightClient, LightClientConfig, SyncConfig, SyncEngine,
    SyncNotification, SyncStatus, WalletScanSink,
};
use lightsync_params::{Checkpoint, CheckpointList, Network, NetworkType};
use prost::Message;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sync-harness")]
#[command(about = "Lightwalletd sync testing harness", long_about = None)]
struct Cli {
    /// Network whose defaults to use (mainnet or testnet)
    #[arg(short, long, default_value = "mainnet", global = true)]
    network: NetworkType,

    /// Lightwalletd endpoint (defaults to the network's server)
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print server info
    Info,

    /// Sync from a checkpoint until converged
    Sync {
        /// Start from the checkpoint at or below this height
        #[arg(long)]
        from: Option<u64>,

        /// JSON checkpoint list to use instead of the bundled one
        #[arg(long)]
        checkpoints: Option<PathBuf>,

        /// Heights per block-range request
        #[arg(short, long)]
        batch_size: Option<u64>,

        /// Keep following the tip after converging
        #[arg(short, long)]
        follow: bool,
    },

    /// Relay a hex-encoded raw transaction
    Broadcast {
        /// Raw transaction bytes (hex)
        raw_tx: String,
    },
}

/// Wallet stand-in that only tracks heights and shielded output counts
struct HeightTracker {
    scanned: u64,
    outputs: u64,
    actions: u64,
}

impl WalletScanSink for HeightTracker {
    fn apply_checkpoint(&mut self, checkpoint: &Checkpoint) -> bool {
        if checkpoint.validate().is_err() {
            return false;
        }
        self.scanned = checkpoint.height;
        true
    }

    fn ingest_block(&mut self, block: &[u8]) -> bool {
        let block = match proto_types::CompactBlock::decode(block) {
            Ok(block) => block,
            Err(e) => {
                warn!("Undecodable block: {}", e);
                return false;
            }
        };
        if block.height == self.scanned {
            return true;
        }
        if block.height != self.scanned + 1 {
            warn!(
                "Block {} does not follow scanned height {}",
                block.height, self.scanned
            );
            return false;
        }
        for tx in &block.vtx {
            self.outputs += tx.outputs.len() as u64;
            self.actions += tx.actions.len() as u64;
        }
        self.scanned = block.height;
        true
    }

    fn last_scanned_height(&self) -> u64 {
        self.scanned
    }

    fn balance(&self) -> u64 {
        0
    }

    fn verified_balance(&self) -> u64 {
        0
    }

    fn current_address(&self) -> String {
        "(view-only harness)".to_string()
    }

    fn build_transaction(&mut self, _request: &BuildTransaction<'_>) -> Option<Vec<u8>> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let network = cli.network;
    let config = match cli.endpoint {
        Some(endpoint) => LightClientConfig::for_endpoint(&endpoint),
        None => LightClientConfig::for_network(network),
    };
    let client = LightClient::with_config(config);

    match cli.command {
        Commands::Info => run_info(&client, network).await,
        Commands::Sync {
            from,
            checkpoints,
            batch_size,
            follow,
        } => run_sync(client, network, from, checkpoints, batch_size, follow).await,
        Commands::Broadcast { raw_tx } => run_broadcast(&client, &raw_tx).await,
    }
}

async fn run_info(client: &LightClient, network: NetworkType) -> anyhow::Result<()> {
    let info = client.get_lightd_info().await?;
    let expected = Network::from_type(network);
    if info.chain_name != expected.chain_name {
        warn!(
            "Server reports chain '{}', expected '{}' for {}",
            info.chain_name, expected.chain_name, expected.name
        );
    }
    println!("{}", serde_json::to_string_pretty(&info_json(&info))?);
    Ok(())
}

fn info_json(info: &lightsync_lightd::LightdInfo) -> serde_json::Value {
    serde_json::json!({
        "version": info.version,
        "vendor": info.vendor,
        "chain_name": info.chain_name,
        "consensus_branch_id": info.consensus_branch_id,
        "block_height": info.block_height,
        "estimated_height": info.estimated_height,
        "sapling_activation_height": info.sapling_activation_height,
    })
}

async fn run_sync(
    client: LightClient,
    network: NetworkType,
    from: Option<u64>,
    checkpoints: Option<PathBuf>,
    batch_size: Option<u64>,
    follow: bool,
) -> anyhow::Result<()> {
    let list = match checkpoints {
        Some(path) => CheckpointList::from_json_file(&path)
            .with_context(|| format!("loading checkpoints from {}", path.display()))?,
        None => CheckpointList::for_network(network),
    };
    let checkpoint = list.checkpoint_at_height(from.unwrap_or(u64::MAX))?.clone();
    if !Network::from_type(network).is_sapling_active(checkpoint.height) {
        warn!("Checkpoint {} is before Sapling activation", checkpoint.height);
    }
    info!("Starting from checkpoint {}", checkpoint.height);

    let mut config = SyncConfig::from_env()?;
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }

    let sink = shared(HeightTracker {
        scanned: 0,
        outputs: 0,
        actions: 0,
    });
    let engine =
        SyncEngine::new(Arc::new(client), Arc::clone(&sink), &checkpoint, config).await?;
    let mut events = engine.subscribe();
    let handle = engine.start().await;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% {msg}")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(250));

    handle.sync()?;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                pb.println("Interrupted");
                break;
            }
            event = events.recv() => event,
        };

        let done = matches!(&event, Ok(event) if !follow && reached_tip(event));
        match event {
            Ok(SyncNotification::SyncStatusUpdated {
                scanned_height,
                tip_height,
            }) => {
                let snapshot = handle.progress().snapshot();
                pb.set_position(snapshot.percentage as u64);
                pb.set_message(format!(
                    "{}/{} | {:.1} blocks/s | ETA {}",
                    scanned_height,
                    tip_height,
                    snapshot.blocks_per_second,
                    snapshot
                        .eta_seconds
                        .map_or_else(|| "-".to_string(), |s| format!("{}s", s)),
                ));
            }
            Ok(SyncNotification::Error { code, message }) => {
                pb.println(format!("{:?}: {}", code, message));
            }
            Ok(SyncNotification::AddressReady { address }) => {
                pb.println(format!("Wallet {}", address));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Dropped {} notifications", skipped),
            Err(RecvError::Closed) => break,
        }
        if done {
            break;
        }
    }

    let progress = handle.progress().snapshot();
    handle.shutdown().await?;
    pb.finish_with_message(format!("stopped at {}", progress.current_height));

    let wallet = sink.lock().await;
    info!(
        "Scanned to {} ({} batches, {} rejected blocks, {} sapling outputs, {} orchard actions)",
        wallet.scanned, progress.batches, progress.ingest_failures, wallet.outputs, wallet.actions
    );
    Ok(())
}

/// A one-shot sync is done once a batch reaches the tip or a pass converges.
/// Waiting for `Converged` alone would add a full refresh interval.
fn reached_tip(event: &SyncNotification) -> bool {
    match event {
        SyncNotification::SyncStatusUpdated {
            scanned_height,
            tip_height,
        } => scanned_height >= tip_height,
        SyncNotification::StatusChanged { status } => *status == SyncStatus::Converged,
        _ => false,
    }
}

async fn run_broadcast(client: &LightClient, raw_tx: &str) -> anyhow::Result<()> {
    let raw_tx = hex::decode(raw_tx.trim()).context("raw transaction is not hex")?;
    let txid = lightsync_lightd::compute_txid(&raw_tx);
    let response = client.send_transaction(raw_tx).await?;
    if response.is_rejected() {
        anyhow::bail!(
            "rejected: {} (code {})",
            response.error_message.unwrap_or_default(),
            response.error_code.unwrap_or_default()
        );
    }
    println!("{}", txid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_at_tip_without_waiting_for_convergence() {
        assert!(reached_tip(&SyncNotification::SyncStatusUpdated {
            scanned_height: 2_000,
            tip_height: 2_000,
        }));
        assert!(!reached_tip(&SyncNotification::SyncStatusUpdated {
            scanned_height: 999,
            tip_height: 2_000,
        }));
        assert!(reached_tip(&SyncNotification::StatusChanged {
            status: SyncStatus::Converged,
        }));
        assert!(!reached_tip(&SyncNotification::StatusChanged {
            status: SyncStatus::Idle,
        }));
    }

    #[test]
    fn test_height_tracker_requires_contiguous_blocks() {
        let mut tracker = HeightTracker {
            scanned: 100,
            outputs: 0,
            actions: 0,
        };
        let block = |height| {
            proto_types::CompactBlock {
                height,
                ..Default::default()
            }
            .encode_to_vec()
        };
        assert!(tracker.ingest_block(&block(100)));
        assert!(tracker.ingest_block(&block(101)));
        assert!(!tracker.ingest_block(&block(103)));
        assert_eq!(tracker.last_scanned_height(), 101);
    }
}
