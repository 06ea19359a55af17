//! Lightwalletd gRPC client
//!
//! Provides connection to lightwalletd servers with:
//! - TLS inferred from the endpoint scheme
//! - Retry logic with exponential backoff and jitter
//! - Compact block streaming over a bounded channel
//! - Single-attempt transaction relay

use crate::planner::BlockRangeRequest;
use crate::proto_types as proto;
use crate::source::{
    metadata_map, BlockStream, BlockStreamSender, BroadcastResponse, ChainSource, ChainTip,
    CompactBlock, StreamStatus,
};
use crate::{Error, Result};
use async_trait::async_trait;
use lightsync_params::{Network, NetworkType};
use prost::Message;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, error, info, warn};

use proto::compact_tx_streamer_client::CompactTxStreamerClient;
use proto::{BlockId, BlockRange, ChainSpec, Empty, RawTransaction};

/// Default endpoint URL (mainnet)
pub const DEFAULT_LIGHTD_URL: &str = Network::mainnet().default_lightd_url;

/// Retry configuration for network operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff to use after `current`, capped at `max_backoff`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_multiplier) as u64;
        let next = Duration::from_millis(next_ms);
        next.min(self.max_backoff)
    }
}

/// TLS configuration for gRPC connection
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Enable TLS
    pub enabled: bool,
    /// Server name for TLS verification (uses endpoint host if None)
    pub server_name: Option<String>,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct LightClientConfig {
    /// Endpoint URL (e.g., "https://mainnet.lightwalletd.com:9067")
    pub endpoint: String,
    /// TLS configuration
    pub tls: TlsConfig,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout; also bounds one block-range stream
    pub request_timeout: Duration,
}

impl Default for LightClientConfig {
    fn default() -> Self {
        Self::for_endpoint(DEFAULT_LIGHTD_URL)
    }
}

impl LightClientConfig {
    /// Config for `endpoint`, with TLS on for `https://` URLs
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim().to_string(),
            tls: TlsConfig {
                enabled: endpoint.trim_start().starts_with("https://"),
                server_name: None,
            },
            retry: RetryConfig::default(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Config for the default endpoint of a network
    pub fn for_network(network_type: NetworkType) -> Self {
        Self::for_endpoint(Network::from_type(network_type).default_lightd_url)
    }

    /// Override the TLS server name
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.tls.server_name = Some(server_name.into());
        self
    }
}

fn jitter_duration(duration: Duration) -> Duration {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return duration;
    }
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    let jittered = (millis as f64 * jitter) as u64;
    Duration::from_millis(jittered.max(1))
}

/// Lightwalletd server info
#[derive(Debug, Clone)]
pub struct LightdInfo {
    /// Server version
    pub version: String,
    /// Vendor name
    pub vendor: String,
    /// Chain name ("main" or "test")
    pub chain_name: String,
    /// Consensus branch id the server reports (hex)
    pub consensus_branch_id: String,
    /// Current block height
    pub block_height: u64,
    /// Estimated network height
    pub estimated_height: u64,
    /// Sapling activation height
    pub sapling_activation_height: u64,
}

impl From<proto::LightdInfo> for LightdInfo {
    fn from(pb: proto::LightdInfo) -> Self {
        Self {
            version: pb.version,
            vendor: pb.vendor,
            chain_name: pb.chain_name,
            consensus_branch_id: pb.consensus_branch_id,
            block_height: pb.block_height,
            estimated_height: pb.estimated_height,
            sapling_activation_height: pb.sapling_activation_height,
        }
    }
}

/// Lightwalletd gRPC client
///
/// Implements [`ChainSource`]. Clones share one channel.
#[derive(Clone)]
pub struct LightClient {
    config: LightClientConfig,
    channel: Arc<Mutex<Option<Channel>>>,
}

#[allow(dead_code)]
fn _assert_light_client_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<LightClient>();
}

impl LightClient {
    /// Create client for `endpoint` with default settings
    pub fn new(endpoint: &str) -> Self {
        Self::with_config(LightClientConfig::for_endpoint(endpoint))
    }

    /// Create client with custom configuration
    pub fn with_config(config: LightClientConfig) -> Self {
        Self {
            config,
            channel: Arc::new(Mutex::new(None)),
        }
    }

    /// Get current endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Client configuration
    pub fn config(&self) -> &LightClientConfig {
        &self.config
    }

    /// Check if a channel has been established
    pub fn is_connected(&self) -> bool {
        self.channel
            .try_lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    /// Open the channel, retrying with backoff
    pub async fn connect(&self) -> Result<()> {
        let channel = self.with_retry("connect", || self.try_connect()).await?;
        info!(endpoint = %self.config.endpoint, "Connected to lightwalletd");
        *self.channel.lock().await = Some(channel);
        Ok(())
    }

    /// Drop the channel; the next request reconnects
    pub async fn disconnect(&self) {
        *self.channel.lock().await = None;
        info!("Disconnected from lightwalletd");
    }

    /// Endpoint with timeouts, plus webpki roots and SNI when TLS is on
    fn build_endpoint(&self) -> Result<Endpoint> {
        let url = &self.config.endpoint;
        let endpoint = Endpoint::from_shared(url.clone())
            .map_err(|e| {
                Error::Connection(format!(
                    "Invalid endpoint '{}' (want https://host:port): {}",
                    url, e
                ))
            })?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout);

        if !self.config.tls.enabled {
            return Ok(endpoint);
        }

        let sni = self.config.tls.server_name.clone().or_else(|| extract_host(url));
        let tls = match sni {
            Some(name) => {
                debug!(server_name = %name, "TLS enabled");
                ClientTlsConfig::new().with_webpki_roots().domain_name(name)
            }
            None => {
                warn!("No host in '{}'; connecting without SNI", url);
                ClientTlsConfig::new().with_webpki_roots()
            }
        };
        endpoint
            .tls_config(tls)
            .map_err(|e| Error::Connection(format!("TLS setup for {} failed: {}", url, e)))
    }

    async fn try_connect(&self) -> Result<Channel> {
        debug!(endpoint = %self.config.endpoint, tls = self.config.tls.enabled, "Dialing");
        self.build_endpoint()?
            .connect()
            .await
            .map_err(|e| {
                Error::Connection(format!("Cannot reach {}: {}", self.config.endpoint, e))
            })
    }

    /// Client on the cached channel, connecting once if there is none
    async fn get_client(&self) -> Result<CompactTxStreamerClient<Channel>> {
        let mut slot = self.channel.lock().await;
        let channel = match slot.as_ref() {
            Some(channel) => channel.clone(),
            None => {
                let channel = self.try_connect().await?;
                info!(endpoint = %self.config.endpoint, "Connected to lightwalletd");
                slot.insert(channel).clone()
            }
        };
        Ok(CompactTxStreamerClient::new(channel))
    }

    /// Tip height, retried
    pub async fn get_latest_block(&self) -> Result<u64> {
        let tip = self
            .with_retry("GetLatestBlock", || async {
                let mut client = self.get_client().await?;
                let spec = ChainSpec {
                    network: String::new(),
                };
                Ok(client.get_latest_block(spec).await?.into_inner())
            })
            .await?;
        debug!(height = tip.height, hash = %hex::encode(&tip.hash), "Remote tip");
        Ok(tip.height)
    }

    /// Server version and chain heights, retried
    pub async fn get_lightd_info(&self) -> Result<LightdInfo> {
        self.with_retry("GetLightdInfo", || async {
            let mut client = self.get_client().await?;
            let info = client.get_lightd_info(Empty {}).await?.into_inner();
            Ok(LightdInfo::from(info))
        })
        .await
    }

    /// Relay a raw transaction once. A transport failure is an error; a
    /// rejection is reported in the response.
    pub async fn send_transaction(&self, raw_tx: Vec<u8>) -> Result<BroadcastResponse> {
        let txid = compute_txid(&raw_tx);
        info!("Broadcasting transaction {} ({} bytes)", txid, raw_tx.len());

        let mut client = self.get_client().await?;
        let request = tonic::Request::new(RawTransaction {
            data: raw_tx,
            height: 0,
        });
        let response = client.send_transaction(request).await?.into_inner();

        if response.error_code == 0 && response.error_message.is_empty() {
            info!("Transaction broadcast successful: {}", txid);
            return Ok(BroadcastResponse::accepted());
        }

        error!(
            "Transaction broadcast failed: code={}, message={}",
            response.error_code, response.error_message
        );
        Ok(BroadcastResponse {
            error_code: Some(response.error_code),
            error_message: Some(response.error_message),
        })
    }

    /// Stream `range` into `tx`, returning the terminal status
    async fn forward_range(
        &self,
        range: BlockRangeRequest,
        tx: &BlockStreamSender,
    ) -> StreamStatus {
        let mut client = match self.get_client().await {
            Ok(client) => client,
            Err(e) => return StreamStatus::from(e),
        };

        let request = tonic::Request::new(BlockRange {
            start: Some(BlockId {
                height: range.start_height,
                hash: Vec::new(),
            }),
            end: Some(BlockId {
                height: range.end_height,
                hash: Vec::new(),
            }),
        });

        let started = Instant::now();
        let mut blocks = match client.get_block_range(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => return StreamStatus::from(&status),
        };

        let mut delivered = 0u64;
        let mut bytes = 0usize;
        loop {
            match blocks.message().await {
                Ok(Some(block)) => {
                    let encoded = block.encode_to_vec();
                    bytes += encoded.len();
                    if !tx.send_block(CompactBlock::new(encoded)).await {
                        debug!(height = block.height, "Block stream receiver dropped");
                        return StreamStatus::error(tonic::Code::Cancelled, "receiver dropped");
                    }
                    delivered += 1;
                }
                Ok(None) => break,
                Err(status) => {
                    warn!(
                        "Block stream {} failed after {} blocks: {}",
                        range, delivered, status
                    );
                    return StreamStatus::from(&status);
                }
            }
        }

        debug!(
            "Streamed {} blocks ({} bytes) for {} in {:?}",
            delivered,
            bytes,
            range,
            started.elapsed()
        );

        let mut status = StreamStatus::ok();
        match blocks.trailers().await {
            Ok(Some(trailers)) => status.metadata = metadata_map(&trailers),
            Ok(None) => {}
            Err(e) => debug!("Could not read stream trailers: {}", e),
        }
        status
    }

    /// Run `operation` up to `retry.max_attempts` times with jittered
    /// exponential backoff between attempts
    async fn with_retry<F, Fut, T>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        let retry = &self.config.retry;
        let mut delay = retry.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= retry.max_attempts {
                error!("{} failed after {} attempts: {}", what, attempt, err);
                return Err(err);
            }
            warn!("{} attempt {} failed, next in {:?}: {}", what, attempt, delay, err);
            tokio::time::sleep(jitter_duration(delay)).await;
            delay = retry.next_backoff(delay);
        }
    }
}

#[async_trait]
impl ChainSource for LightClient {
    async fn latest_tip(&self) -> Result<ChainTip> {
        let height = self.get_latest_block().await?;
        Ok(ChainTip { height })
    }

    fn stream_blocks(&self, range: BlockRangeRequest, buffer: usize) -> BlockStream {
        let (tx, stream) = BlockStream::channel(buffer);
        let client = self.clone();
        tokio::spawn(async move {
            let status = client.forward_range(range, &tx).await;
            tx.finish(status).await;
        });
        stream
    }

    async fn broadcast_transaction(&self, raw_tx: Vec<u8>) -> Result<BroadcastResponse> {
        self.send_transaction(raw_tx).await
    }
}

/// Extract hostname from URL
fn extract_host(url: &str) -> Option<String> {
    let without_proto = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    without_proto
        .split([':', '/'])
        .next()
        .filter(|host| !host.is_empty())
        .map(|s| s.to_string())
}

/// Transaction id: double SHA-256 of the raw bytes, reversed, hex
pub fn compute_txid(raw_tx: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let hash1 = Sha256::digest(raw_tx);
    let hash2 = Sha256::digest(hash1);

    let mut txid_bytes: [u8; 32] = hash2.into();
    txid_bytes.reverse();

    hex::encode(txid_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LightClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_LIGHTD_URL);
        assert!(config.tls.enabled);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_tls_follows_scheme() {
        assert!(!LightClientConfig::for_endpoint("http://localhost:9067").tls.enabled);
        assert!(LightClientConfig::for_endpoint(" https://lightd:9067").tls.enabled);
        assert!(LightClientConfig::for_network(NetworkType::Testnet).tls.enabled);
    }

    #[test]
    fn test_client_creation() {
        let client = LightClient::new("http://127.0.0.1:9067");
        assert!(!client.is_connected());
        assert_eq!(client.endpoint(), "http://127.0.0.1:9067");
    }

    #[test]
    fn test_backoff_growth() {
        let retry = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(30),
            backoff_multiplier: 2.0,
        };
        let second = retry.next_backoff(retry.initial_backoff);
        assert_eq!(second, Duration::from_millis(20));
        assert_eq!(retry.next_backoff(second), Duration::from_millis(30));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let jittered = jitter_duration(Duration::from_millis(1_000));
            assert!(jittered >= Duration::from_millis(800));
            assert!(jittered <= Duration::from_millis(1_200));
        }
        assert_eq!(jitter_duration(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://mainnet.lightwalletd.com:9067"),
            Some("mainnet.lightwalletd.com".to_string())
        );
        assert_eq!(
            extract_host("http://localhost:9067"),
            Some("localhost".to_string())
        );
        assert_eq!(
            extract_host("example.com/grpc"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_host("https://"), None);
    }

    #[test]
    fn test_compute_txid() {
        // Double SHA-256 of the empty string, byte-reversed.
        assert_eq!(
            compute_txid(&[]),
            "56944c5d3f98413ef45cf54545538103cc9f298e0575820ad3591376e2e0f65d"
        );
        assert_eq!(compute_txid(&[1, 2, 3, 4, 5]).len(), 64);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_connection_error() {
        let mut config = LightClientConfig::for_endpoint("not a url");
        config.retry.max_attempts = 1;
        let client = LightClient::with_config(config);
        assert!(matches!(client.connect().await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_stream_open_failure_becomes_status() {
        let mut config = LightClientConfig::for_endpoint("not a url");
        config.retry.max_attempts = 1;
        let client = LightClient::with_config(config);

        let mut stream = client.stream_blocks(
            BlockRangeRequest {
                start_height: 1,
                end_height: 2,
            },
            4,
        );
        match stream.next().await {
            Some(crate::source::StreamEvent::Status(status)) => {
                assert_eq!(status.code, tonic::Code::Unavailable);
                assert!(status.details.contains("Invalid endpoint"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
