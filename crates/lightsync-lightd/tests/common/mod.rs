//! Scripted chain source and in-memory wallet shared by the engine and
//! submitter tests

#![allow(dead_code)]

use async_trait::async_trait;
use lightsync_lightd::proto_types;
use lightsync_lightd::{
    BlockRangeRequest, BlockStream, BroadcastResponse, BuildTransaction, ChainSource, ChainTip,
    CompactBlock, Error, Result, StreamStatus, SyncNotification, WalletScanSink,
};
use lightsync_params::Checkpoint;
use parking_lot::Mutex;
use prost::Message;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const TEST_ADDRESS: &str = "zs1testaddressqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq";

/// Serialized compact block carrying only its height
pub fn encode_block(height: u64) -> Vec<u8> {
    proto_types::CompactBlock {
        proto_version: 1,
        height,
        hash: height.to_le_bytes().to_vec(),
        ..Default::default()
    }
    .encode_to_vec()
}

pub fn checkpoint(height: u64) -> Checkpoint {
    Checkpoint {
        height,
        hash: hex_hash(height),
        tree_state: "000000".to_string(),
    }
}

fn hex_hash(height: u64) -> String {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    hex::encode(bytes)
}

/// How a scripted stream ends after its blocks
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// Send this terminal status
    Status(StreamStatus),
    /// Drop the sender without a status
    Drop,
    /// Keep the stream open until the receiver goes away
    HoldOpen,
}

/// Scripted [`ChainSource`]
pub struct MockSource {
    tip: AtomicU64,
    tip_failure: Mutex<Option<tonic::Code>>,
    stop_after: Mutex<Option<u64>>,
    stream_end: Mutex<StreamEnd>,
    broadcast_response: Mutex<BroadcastResponse>,
    tip_calls: AtomicUsize,
    requests: Mutex<Vec<BlockRangeRequest>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    released: Arc<AtomicBool>,
}

impl MockSource {
    pub fn new(tip: u64) -> Self {
        Self {
            tip: AtomicU64::new(tip),
            tip_failure: Mutex::new(None),
            stop_after: Mutex::new(None),
            stream_end: Mutex::new(StreamEnd::Status(StreamStatus::ok())),
            broadcast_response: Mutex::new(BroadcastResponse::accepted()),
            tip_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn fail_tip(&self, code: Option<tonic::Code>) {
        *self.tip_failure.lock() = code;
    }

    /// Deliver blocks only up to `height` in every stream
    pub fn stop_after(&self, height: Option<u64>) {
        *self.stop_after.lock() = height;
    }

    pub fn end_streams_with(&self, end: StreamEnd) {
        *self.stream_end.lock() = end;
    }

    pub fn respond_to_broadcast(&self, response: BroadcastResponse) {
        *self.broadcast_response.lock() = response;
    }

    pub fn tip_calls(&self) -> usize {
        self.tip_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<BlockRangeRequest> {
        self.requests.lock().clone()
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().clone()
    }

    /// Whether a held-open stream saw its receiver dropped
    pub fn stream_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSource for MockSource {
    async fn latest_tip(&self) -> Result<ChainTip> {
        self.tip_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = *self.tip_failure.lock() {
            return Err(Error::Transport {
                code,
                message: "tip unavailable".to_string(),
            });
        }
        Ok(ChainTip {
            height: self.tip.load(Ordering::SeqCst),
        })
    }

    fn stream_blocks(&self, range: BlockRangeRequest, buffer: usize) -> BlockStream {
        self.requests.lock().push(range);
        let last = self
            .stop_after
            .lock()
            .map_or(range.end_height, |h| h.min(range.end_height));
        let end = self.stream_end.lock().clone();
        let released = Arc::clone(&self.released);

        let (tx, stream) = BlockStream::channel(buffer);
        tokio::spawn(async move {
            for height in range.start_height..=last {
                if !tx.send_block(CompactBlock::new(encode_block(height))).await {
                    return;
                }
            }
            match end {
                StreamEnd::Status(status) => tx.finish(status).await,
                StreamEnd::Drop => drop(tx),
                StreamEnd::HoldOpen => {
                    while !tx.is_closed() {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    released.store(true, Ordering::SeqCst);
                }
            }
        });
        stream
    }

    async fn broadcast_transaction(&self, raw_tx: Vec<u8>) -> Result<BroadcastResponse> {
        self.broadcasts.lock().push(raw_tx);
        Ok(self.broadcast_response.lock().clone())
    }
}

/// In-memory wallet that tracks heights decoded from compact blocks
#[derive(Debug)]
pub struct MemorySink {
    pub scanned: u64,
    pub delivered: Vec<u64>,
    pub fail_heights: HashSet<u64>,
    pub reject_checkpoint: bool,
    pub balance: u64,
    pub verified: u64,
    pub built: Option<Vec<u8>>,
    pub build_calls: usize,
    pub last_branch_id: Option<u32>,
    /// Advance one height per accepted block regardless of block contents
    pub counting: bool,
    /// Simulated proving time in `build_transaction`
    pub build_delay: Duration,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            scanned: 0,
            delivered: Vec::new(),
            fail_heights: HashSet::new(),
            reject_checkpoint: false,
            balance: 0,
            verified: 0,
            built: None,
            build_calls: 0,
            last_branch_id: None,
            counting: false,
            build_delay: Duration::ZERO,
        }
    }

    /// Wallet that advances by exactly the number of blocks it is sent
    pub fn counting() -> Self {
        Self {
            counting: true,
            ..Self::new()
        }
    }

    pub fn failing_at(heights: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_heights: heights.into_iter().collect(),
            ..Self::new()
        }
    }
}

impl WalletScanSink for MemorySink {
    fn apply_checkpoint(&mut self, checkpoint: &Checkpoint) -> bool {
        if self.reject_checkpoint {
            return false;
        }
        self.scanned = checkpoint.height;
        true
    }

    fn ingest_block(&mut self, block: &[u8]) -> bool {
        let height = match proto_types::CompactBlock::decode(block) {
            Ok(block) => block.height,
            Err(_) => return false,
        };
        self.delivered.push(height);
        if self.counting {
            self.scanned += 1;
            return true;
        }
        if height == self.scanned {
            return true;
        }
        if self.fail_heights.contains(&height) {
            return false;
        }
        self.scanned = self.scanned.max(height);
        true
    }

    fn last_scanned_height(&self) -> u64 {
        self.scanned
    }

    fn balance(&self) -> u64 {
        self.balance
    }

    fn verified_balance(&self) -> u64 {
        self.verified
    }

    fn current_address(&self) -> String {
        TEST_ADDRESS.to_string()
    }

    fn build_transaction(&mut self, request: &BuildTransaction<'_>) -> Option<Vec<u8>> {
        self.build_calls += 1;
        if !self.build_delay.is_zero() {
            std::thread::sleep(self.build_delay);
        }
        self.last_branch_id = Some(request.consensus_branch_id);
        self.built.clone()
    }
}

/// Everything published so far, without waiting
pub fn drain(rx: &mut broadcast::Receiver<SyncNotification>) -> Vec<SyncNotification> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the first notification matching `pred`
pub async fn wait_for(
    rx: &mut broadcast::Receiver<SyncNotification>,
    pred: impl Fn(&SyncNotification) -> bool,
) -> SyncNotification {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("notifier closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}
