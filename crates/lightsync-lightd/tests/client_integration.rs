//! Integration tests for LightClient
//!
//! Run live tests with:
//!   cargo test --package lightsync-lightd --features live_lightd -- --ignored
//!
//! Run offline tests with:
//!   cargo test --package lightsync-lightd client_integration

use lightsync_lightd::{
    BlockRangeRequest, ChainSource, LightClient, LightClientConfig, RetryConfig, StreamEvent,
    DEFAULT_LIGHTD_URL,
};
use lightsync_params::NetworkType;
use std::time::Duration;

// ============================================================================
// Offline tests (no network required)
// ============================================================================

#[test]
fn test_default_endpoint() {
    assert_eq!(DEFAULT_LIGHTD_URL, "https://mainnet.lightwalletd.com:9067");
    let config = LightClientConfig::default();
    assert_eq!(config.endpoint, DEFAULT_LIGHTD_URL);
    assert!(config.tls.enabled);
    assert!(config.tls.server_name.is_none());
}

#[test]
fn test_testnet_config() {
    let config = LightClientConfig::for_network(NetworkType::Testnet)
        .with_server_name("lightwalletd.testnet.local");
    assert_eq!(config.endpoint, "https://testnet.lightwalletd.com:9067");
    assert_eq!(
        config.tls.server_name.as_deref(),
        Some("lightwalletd.testnet.local")
    );
}

#[test]
fn test_clones_share_endpoint() {
    let client = LightClient::new("http://127.0.0.1:9067");
    let cloned = client.clone();
    assert_eq!(client.endpoint(), cloned.endpoint());
    assert!(!cloned.is_connected());
}

fn unreachable_client() -> LightClient {
    // Port 9 (discard) on localhost is closed on test machines
    let mut config = LightClientConfig::for_endpoint("http://127.0.0.1:9");
    config.connect_timeout = Duration::from_millis(200);
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
        backoff_multiplier: 2.0,
    };
    LightClient::with_config(config)
}

#[tokio::test]
async fn test_unreachable_tip_is_error() {
    let client = unreachable_client();
    assert!(client.latest_tip().await.is_err());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_unreachable_stream_ends_with_status() {
    let client = unreachable_client();
    let mut stream = client.stream_blocks(
        BlockRangeRequest {
            start_height: 100,
            end_height: 105,
        },
        8,
    );

    match stream.next().await {
        Some(StreamEvent::Status(status)) => assert!(!status.is_ok()),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_unreachable_broadcast_is_error() {
    let client = unreachable_client();
    assert!(client.broadcast_transaction(vec![1, 2, 3]).await.is_err());
}

// ============================================================================
// Live tests (require network access)
// ============================================================================

#[cfg(feature = "live_lightd")]
mod live {
    use super::*;
    use lightsync_lightd::proto_types;
    use prost::Message;

    const TEST_ENDPOINT: &str = DEFAULT_LIGHTD_URL;
    const SAPLING_ACTIVATION: u64 = 419_200;

    #[tokio::test]
    #[ignore = "Requires live network"]
    async fn test_live_connect() {
        let client = LightClient::new(TEST_ENDPOINT);
        client.connect().await.expect("Failed to connect");
        assert!(client.is_connected());
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    #[ignore = "Requires live network"]
    async fn test_live_latest_tip() {
        let client = LightClient::new(TEST_ENDPOINT);
        let tip = client.latest_tip().await.expect("Failed to get tip");
        assert!(tip.height > SAPLING_ACTIVATION);
    }

    #[tokio::test]
    #[ignore = "Requires live network"]
    async fn test_live_lightd_info() {
        let client = LightClient::new(TEST_ENDPOINT);
        let info = client.get_lightd_info().await.expect("Failed to get info");
        assert_eq!(info.chain_name, "main");
        assert_eq!(info.sapling_activation_height, SAPLING_ACTIVATION);
        assert!(info.block_height > SAPLING_ACTIVATION);
    }

    #[tokio::test]
    #[ignore = "Requires live network"]
    async fn test_live_block_range_in_order() {
        let client = LightClient::new(TEST_ENDPOINT);
        let range = BlockRangeRequest {
            start_height: SAPLING_ACTIVATION,
            end_height: SAPLING_ACTIVATION + 9,
        };
        let mut stream = client.stream_blocks(range, 4);

        let mut heights = Vec::new();
        let status = loop {
            match stream.next().await {
                Some(StreamEvent::Block(block)) => {
                    let decoded = proto_types::CompactBlock::decode(block.as_bytes())
                        .expect("Block does not decode");
                    heights.push(decoded.height);
                }
                Some(StreamEvent::Status(status)) => break status,
                None => panic!("stream closed without status"),
            }
        };

        assert!(status.is_ok(), "stream failed: {:?}", status);
        let expected: Vec<u64> = (range.start_height..=range.end_height).collect();
        assert_eq!(heights, expected);
    }

    #[tokio::test]
    #[ignore = "Requires live network"]
    async fn test_live_garbage_transaction_rejected() {
        let client = LightClient::new(TEST_ENDPOINT);
        let response = client
            .broadcast_transaction(vec![0u8; 32])
            .await
            .expect("Relay call failed");
        assert!(response.is_rejected());
    }
}
