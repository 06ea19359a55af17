//! Error types for sync and submission

use serde::Serialize;
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Taxonomy code attached to every error notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Tip fetch or stream-level transport failure
    TransportError,
    /// Stream completed below the requested end height
    StreamEarlyTermination,
    /// The wallet rejected one block during a batch
    ScanIngestFailure,
    /// Remote tip is below the locally scanned height
    TipRegression,
    /// The wallet could not build a transaction
    ConstructionFailed,
    /// The network rejected a broadcast transaction
    BroadcastRejected,
    /// The initial checkpoint was refused by the wallet
    CheckpointInvalid,
    /// Anything outside the sync taxonomy (config, IO, cancellation)
    Internal,
}

impl ErrorCode {
    /// Stable string form used in logs and notifications
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportError => "TransportError",
            Self::StreamEarlyTermination => "StreamEarlyTermination",
            Self::ScanIngestFailure => "ScanIngestFailure",
            Self::TipRegression => "TipRegression",
            Self::ConstructionFailed => "ConstructionFailed",
            Self::BroadcastRejected => "BroadcastRejected",
            Self::CheckpointInvalid => "CheckpointInvalid",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tip fetch, stream or broadcast transport failure (code/message verbatim from the provider)
    #[error("Transport error: code {code:?} \"{message}\"")]
    Transport {
        /// Provider status code
        code: tonic::Code,
        /// Provider message
        message: String,
    },

    /// Stream ended before the wallet reached the requested height
    #[error("Block stream finished at height {scanned}, expected {expected}")]
    StreamEarlyTermination {
        /// Requested end height
        expected: u64,
        /// Height reported by the wallet after the stream
        scanned: u64,
    },

    /// Wallet rejected a block
    #[error("Failed to scan block #{index} of batch starting at {batch_start}")]
    ScanIngestFailure {
        /// First height of the batch
        batch_start: u64,
        /// Zero-based position of the block in delivery order
        index: u64,
    },

    /// Remote tip is lower than what was already scanned
    #[error("Remote tip {tip} is below scanned height {scanned}")]
    TipRegression {
        /// Locally scanned height
        scanned: u64,
        /// Remote tip height
        tip: u64,
    },

    /// Transaction could not be built
    #[error("Failed to create transaction")]
    ConstructionFailed,

    /// Network rejected the transaction
    #[error("Broadcast rejected: {message} (code {code})")]
    BroadcastRejected {
        /// Remote error code
        code: i32,
        /// Remote error message
        message: String,
    },

    /// Checkpoint could not be applied to the wallet
    #[error("Invalid checkpoint data at height {height}")]
    CheckpointInvalid {
        /// Checkpoint height
        height: u64,
    },

    /// Illegal state machine edge
    #[error("Invalid sync transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: crate::state::SyncStatus,
        /// Requested status
        to: crate::state::SyncStatus,
    },

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sapling parameter files missing or unreadable
    #[error("Parameter error: {0}")]
    Params(String),

    /// Operation cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Sync engine task is gone
    #[error("Sync engine is not running")]
    EngineStopped,

    /// Network, checkpoint or amount error
    #[error("Chain settings error: {0}")]
    Network(#[from] lightsync_params::Error),

    /// Tonic transport error
    #[error("Transport setup error: {0}")]
    TransportSetup(#[from] tonic::transport::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Transport {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl Error {
    /// Taxonomy code for notifications
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } | Self::Connection(_) | Self::TransportSetup(_) => {
                ErrorCode::TransportError
            }
            Self::StreamEarlyTermination { .. } => ErrorCode::StreamEarlyTermination,
            Self::ScanIngestFailure { .. } => ErrorCode::ScanIngestFailure,
            Self::TipRegression { .. } => ErrorCode::TipRegression,
            Self::ConstructionFailed => ErrorCode::ConstructionFailed,
            Self::BroadcastRejected { .. } => ErrorCode::BroadcastRejected,
            Self::CheckpointInvalid { .. } => ErrorCode::CheckpointInvalid,
            _ => ErrorCode::Internal,
        }
    }
}
