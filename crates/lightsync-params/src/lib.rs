//! Zcash light client network parameters and constants
//!
//! Network definitions, sync constants, zatoshi amounts and the trusted
//! checkpoints a light wallet is seeded from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod checkpoints;
pub mod consensus;
pub mod network;

pub use amount::{Amount, COIN};
pub use checkpoints::{Checkpoint, CheckpointList};
pub use consensus::{CHAIN_REFRESH_INTERVAL, DEFAULT_BATCH_SIZE, SAPLING_CONSENSUS_BRANCH_ID};
pub use network::{Network, NetworkType};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown network name
    #[error("Unknown network '{0}' (expected mainnet or testnet)")]
    InvalidNetwork(String),

    /// Checkpoint not found
    #[error("No checkpoint found for height {0}")]
    CheckpointNotFound(u64),

    /// Checkpoint data is malformed
    #[error("Invalid checkpoint at height {height}: {reason}")]
    InvalidCheckpoint {
        /// Checkpoint height
        height: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Amount could not be parsed or is out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
