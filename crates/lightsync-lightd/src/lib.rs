//! Lightwalletd chain synchronization engine
//!
//! Keeps a wallet in step with a lightwalletd server: fetches the tip, streams
//! missing blocks in bounded batches into the wallet's scan routine, tracks
//! convergence, and relays signed transactions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

pub mod cancel;
pub mod client;
pub mod error;
pub mod notify;
pub mod params;
pub mod planner;
pub mod progress;
pub mod proto_types;
pub mod sink;
pub mod source;
pub mod state;
pub mod submit;
pub mod sync;
pub mod timer;

pub use cancel::CancelToken;
pub use client::{
    compute_txid, LightClient, LightClientConfig, LightdInfo, RetryConfig, TlsConfig,
    DEFAULT_LIGHTD_URL,
};
pub use error::{Error, ErrorCode, Result};
pub use notify::{Notifier, SyncNotification};
pub use params::SaplingParams;
pub use planner::{plan, plan_with_batch_size, BlockRangeRequest};
pub use progress::{ProgressSnapshot, SyncProgress};
pub use sink::{shared, Balance, BuildTransaction, SharedSink, WalletScanSink};
pub use source::{
    BlockStream, BlockStreamSender, BroadcastResponse, ChainSource, ChainTip, CompactBlock,
    StreamEvent, StreamStatus,
};
pub use state::{SyncState, SyncStatus};
pub use submit::{SubmitReceipt, TransactionSubmitter};
pub use sync::{BatchReport, PassOutcome, SyncConfig, SyncEngine, SyncHandle};
pub use timer::PassTimer;
