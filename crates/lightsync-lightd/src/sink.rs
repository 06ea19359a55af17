//! Wallet scan sink abstraction
//!
//! The wallet is a black box to the engine: it accepts a checkpoint, ingests
//! serialized blocks, reports heights and balances, and signs transactions.
//! Calls are synchronous and take `&mut self`; the engine and the submitter
//! share one sink behind a [`SharedSink`] mutex so calls never overlap. The
//! mutex is async: the engine waits for it without parking a runtime thread
//! while the submitter holds it on the blocking pool.

use lightsync_params::{Amount, Checkpoint};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sink shared between the engine and the transaction submitter
pub type SharedSink<W> = Arc<Mutex<W>>;

/// Wrap a sink for sharing
pub fn shared<W: WalletScanSink>(sink: W) -> SharedSink<W> {
    Arc::new(Mutex::new(sink))
}

/// Wallet balances in zatoshis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Total balance
    pub total: u64,
    /// Balance spendable now
    pub verified: u64,
}

impl Balance {
    /// Total in coins, for display
    pub fn total_coins(&self) -> f64 {
        Amount::from_zatoshis(self.total).as_coins_f64()
    }

    /// Verified balance in coins, for display
    pub fn verified_coins(&self) -> f64 {
        Amount::from_zatoshis(self.verified).as_coins_f64()
    }
}

/// Inputs for building one signed transaction
#[derive(Debug, Clone, Copy)]
pub struct BuildTransaction<'a> {
    /// Consensus branch the transaction commits to
    pub consensus_branch_id: u32,
    /// Sapling spend proving parameters
    pub spend_params: &'a [u8],
    /// Sapling output proving parameters
    pub output_params: &'a [u8],
    /// Recipient address
    pub destination: &'a str,
    /// Value to send
    pub amount: Amount,
}

/// Wallet scan routine and signer
pub trait WalletScanSink: Send + 'static {
    /// Install the trust anchor. Returns `false` if the data is rejected.
    fn apply_checkpoint(&mut self, checkpoint: &Checkpoint) -> bool;

    /// Scan one serialized block. Returns `false` on failure.
    ///
    /// Re-delivery of the block at the last scanned height must succeed
    /// without changing wallet state.
    fn ingest_block(&mut self, block: &[u8]) -> bool;

    /// Height of the last block successfully scanned
    fn last_scanned_height(&self) -> u64;

    /// Total balance in zatoshis
    fn balance(&self) -> u64;

    /// Verified balance in zatoshis
    fn verified_balance(&self) -> u64;

    /// Current receiving address
    fn current_address(&self) -> String;

    /// Build and sign a transaction; `None` if construction fails
    fn build_transaction(&mut self, request: &BuildTransaction<'_>) -> Option<Vec<u8>>;

    /// Both balances at once
    fn balances(&self) -> Balance {
        Balance {
            total: self.balance(),
            verified: self.verified_balance(),
        }
    }
}
