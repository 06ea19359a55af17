//! Chain source abstraction
//!
//! A [`ChainSource`] answers tip queries, streams block ranges and relays
//! transactions. Block ranges arrive over a bounded channel: zero or more
//! [`StreamEvent::Block`] messages followed by exactly one
//! [`StreamEvent::Status`]. The transport side holds a [`BlockStreamSender`],
//! whose `finish` consumes it, so a second status cannot be sent.

use crate::planner::BlockRangeRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Remote chain tip, refreshed once per pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    /// Tip height
    pub height: u64,
}

/// Serialized compact block, passed to the wallet unmodified
#[derive(Clone, PartialEq, Eq)]
pub struct CompactBlock(Vec<u8>);

impl CompactBlock {
    /// Wrap serialized block bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the serialized bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the serialized bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Serialized length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the block carries no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CompactBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactBlock({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for CompactBlock {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Terminal status of a block stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatus {
    /// Transport status code; `Ok` is success
    pub code: tonic::Code,
    /// Provider details, verbatim
    pub details: String,
    /// Trailing metadata, if the provider sent any
    pub metadata: Option<BTreeMap<String, String>>,
}

impl StreamStatus {
    /// Successful completion
    pub fn ok() -> Self {
        Self {
            code: tonic::Code::Ok,
            details: String::new(),
            metadata: None,
        }
    }

    /// Failure with a code and details
    pub fn error(code: tonic::Code, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
            metadata: None,
        }
    }

    /// Whether the stream completed successfully
    pub fn is_ok(&self) -> bool {
        self.code == tonic::Code::Ok
    }

    /// Convert a non-OK status into a transport error
    pub fn to_error(&self) -> Option<Error> {
        if self.is_ok() {
            return None;
        }
        Some(Error::Transport {
            code: self.code,
            message: self.details.clone(),
        })
    }
}

/// ASCII metadata entries as a sorted map; `None` when there are none
pub(crate) fn metadata_map(
    metadata: &tonic::metadata::MetadataMap,
) -> Option<BTreeMap<String, String>> {
    let map: BTreeMap<String, String> = metadata
        .iter()
        .filter_map(|entry| match entry {
            tonic::metadata::KeyAndValueRef::Ascii(key, value) => value
                .to_str()
                .ok()
                .map(|v| (key.as_str().to_string(), v.to_string())),
            tonic::metadata::KeyAndValueRef::Binary(_, _) => None,
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

impl From<&tonic::Status> for StreamStatus {
    fn from(status: &tonic::Status) -> Self {
        Self {
            code: status.code(),
            details: status.message().to_string(),
            metadata: metadata_map(status.metadata()),
        }
    }
}

impl From<Error> for StreamStatus {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport { code, message } => Self::error(code, message),
            other => Self::error(tonic::Code::Unavailable, other.to_string()),
        }
    }
}

/// One message of a block stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A block, in delivery order
    Block(CompactBlock),
    /// Terminal status; nothing follows it
    Status(StreamStatus),
}

/// Receiving half of a block stream
#[derive(Debug)]
pub struct BlockStream {
    rx: mpsc::Receiver<StreamEvent>,
}

/// Sending half of a block stream, held by the transport task
#[derive(Debug)]
pub struct BlockStreamSender {
    tx: mpsc::Sender<StreamEvent>,
}

impl BlockStream {
    /// Create a bounded stream. `buffer` is the backpressure window.
    pub fn channel(buffer: usize) -> (BlockStreamSender, BlockStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (BlockStreamSender { tx }, BlockStream { rx })
    }

    /// A stream that terminates immediately with `status`
    pub fn failed(status: StreamStatus) -> BlockStream {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh receiver: try_send cannot fail.
        let _ = tx.try_send(StreamEvent::Status(status));
        BlockStream { rx }
    }

    /// Next message. `None` means the sender went away without a status.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl BlockStreamSender {
    /// Forward one block. Returns `false` once the receiver is gone.
    pub async fn send_block(&self, block: CompactBlock) -> bool {
        self.tx.send(StreamEvent::Block(block)).await.is_ok()
    }

    /// Send the terminal status and close the stream
    pub async fn finish(self, status: StreamStatus) {
        let _ = self.tx.send(StreamEvent::Status(status)).await;
    }

    /// Whether the receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Response to a broadcast request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResponse {
    /// Remote error code, if any
    pub error_code: Option<i32>,
    /// Remote error message, if any
    pub error_message: Option<String>,
}

impl BroadcastResponse {
    /// Accepted without error
    pub fn accepted() -> Self {
        Self::default()
    }

    /// Rejected with a code and message
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    /// Whether the response carries a non-empty error
    pub fn is_rejected(&self) -> bool {
        self.error_code.is_some_and(|code| code != 0)
            || self
                .error_message
                .as_deref()
                .is_some_and(|message| !message.is_empty())
    }
}

/// Remote chain-indexing service
#[async_trait]
pub trait ChainSource: Send + Sync + 'static {
    /// Fetch the latest tip
    async fn latest_tip(&self) -> Result<ChainTip>;

    /// Open a stream for `range` with a `buffer`-message window.
    ///
    /// Open failures are delivered as the terminal status, never as a
    /// missing stream.
    fn stream_blocks(&self, range: BlockRangeRequest, buffer: usize) -> BlockStream;

    /// Relay a signed transaction
    async fn broadcast_transaction(&self, raw_tx: Vec<u8>) -> Result<BroadcastResponse>;
}
