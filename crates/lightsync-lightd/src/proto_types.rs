//! Lightwalletd gRPC message and client definitions
//!
//! Hand-written prost messages for the subset of the
//! `cash.z.wallet.sdk.rpc.CompactTxStreamer` service the sync engine uses:
//! tip queries, block range streaming, transaction relay and server info.
//! Keeping them in source avoids a protoc dependency at build time.

#![allow(missing_docs)]

use prost::Message;

/// Compact block as served by lightwalletd
#[derive(Clone, PartialEq, Message)]
pub struct CompactBlock {
    #[prost(uint32, tag = "1")]
    pub proto_version: u32,
    #[prost(uint64, tag = "2")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub prev_hash: Vec<u8>,
    #[prost(uint32, tag = "5")]
    pub time: u32,
    #[prost(bytes = "vec", tag = "6")]
    pub header: Vec<u8>,
    #[prost(message, repeated, tag = "7")]
    pub vtx: Vec<CompactTx>,
    #[prost(message, optional, tag = "8")]
    pub chain_metadata: Option<ChainMetadata>,
}

/// Note commitment tree sizes at the end of a block
#[derive(Clone, Copy, PartialEq, Message)]
pub struct ChainMetadata {
    #[prost(uint32, tag = "1")]
    pub sapling_commitment_tree_size: u32,
    #[prost(uint32, tag = "2")]
    pub orchard_commitment_tree_size: u32,
}

/// Shielded parts of one transaction
#[derive(Clone, PartialEq, Message)]
pub struct CompactTx {
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub fee: u32,
    #[prost(message, repeated, tag = "4")]
    pub spends: Vec<CompactSaplingSpend>,
    #[prost(message, repeated, tag = "5")]
    pub outputs: Vec<CompactSaplingOutput>,
    #[prost(message, repeated, tag = "6")]
    pub actions: Vec<CompactOrchardAction>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CompactSaplingSpend {
    #[prost(bytes = "vec", tag = "1")]
    pub nf: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CompactSaplingOutput {
    #[prost(bytes = "vec", tag = "1")]
    pub cmu: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub ephemeral_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CompactOrchardAction {
    #[prost(bytes = "vec", tag = "1")]
    pub nullifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub cmx: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ephemeral_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub ciphertext: Vec<u8>,
}

/// Block identified by height and/or hash
#[derive(Clone, PartialEq, Message)]
pub struct BlockId {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

/// Inclusive block range
#[derive(Clone, PartialEq, Message)]
pub struct BlockRange {
    #[prost(message, optional, tag = "1")]
    pub start: Option<BlockId>,
    #[prost(message, optional, tag = "2")]
    pub end: Option<BlockId>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, Message)]
pub struct ChainSpec {
    #[prost(string, tag = "1")]
    pub network: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RawTransaction {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub height: u64,
}

/// `error_code == 0` with an empty message means accepted
#[derive(Clone, PartialEq, Message)]
pub struct SendResponse {
    #[prost(int32, tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct LightdInfo {
    #[prost(string, tag = "1")]
    pub version: String,
    #[prost(string, tag = "2")]
    pub vendor: String,
    #[prost(bool, tag = "3")]
    pub taddr_support: bool,
    #[prost(string, tag = "4")]
    pub chain_name: String,
    #[prost(uint64, tag = "5")]
    pub sapling_activation_height: u64,
    #[prost(string, tag = "6")]
    pub consensus_branch_id: String,
    #[prost(uint64, tag = "7")]
    pub block_height: u64,
    #[prost(string, tag = "8")]
    pub git_commit: String,
    #[prost(string, tag = "9")]
    pub branch: String,
    #[prost(string, tag = "10")]
    pub build_date: String,
    #[prost(string, tag = "11")]
    pub build_user: String,
    #[prost(uint64, tag = "12")]
    pub estimated_height: u64,
    #[prost(string, tag = "13")]
    pub zcashd_build: String,
    #[prost(string, tag = "14")]
    pub zcashd_subversion: String,
}

/// CompactTxStreamer client
pub mod compact_tx_streamer_client {
    #![allow(unused_variables, dead_code, clippy::wildcard_imports, clippy::let_unit_value)]

    use super::*;
    use tonic::codegen::http::Uri;
    use tonic::codegen::*;

    const SERVICE: &str = "cash.z.wallet.sdk.rpc.CompactTxStreamer";

    #[derive(Debug, Clone)]
    pub struct CompactTxStreamerClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl CompactTxStreamerClient<tonic::transport::Channel> {
        pub fn new(channel: tonic::transport::Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }
    }

    impl<T> CompactTxStreamerClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn with_inner(inner: T) -> Self {
            Self {
                inner: tonic::client::Grpc::new(inner),
            }
        }

        pub fn with_origin(inner: T, origin: Uri) -> Self {
            Self {
                inner: tonic::client::Grpc::with_origin(inner, origin),
            }
        }

        async fn ready(&mut self) -> std::result::Result<(), tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })
        }

        fn prepare<M>(
            request: impl tonic::IntoRequest<M>,
            method: &'static str,
        ) -> tonic::Request<M> {
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(SERVICE, method));
            req
        }

        /// Latest block id (tip)
        pub async fn get_latest_block(
            &mut self,
            request: impl tonic::IntoRequest<ChainSpec>,
        ) -> std::result::Result<tonic::Response<BlockId>, tonic::Status> {
            self.ready().await?;
            let path = http::uri::PathAndQuery::from_static(
                "/cash.z.wallet.sdk.rpc.CompactTxStreamer/GetLatestBlock",
            );
            let req = Self::prepare(request, "GetLatestBlock");
            self.inner
                .unary(req, path, tonic::codec::ProstCodec::default())
                .await
        }

        /// Stream compact blocks in an inclusive range
        pub async fn get_block_range(
            &mut self,
            request: impl tonic::IntoRequest<BlockRange>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<CompactBlock>>,
            tonic::Status,
        > {
            self.ready().await?;
            let path = http::uri::PathAndQuery::from_static(
                "/cash.z.wallet.sdk.rpc.CompactTxStreamer/GetBlockRange",
            );
            let req = Self::prepare(request, "GetBlockRange");
            self.inner
                .server_streaming(req, path, tonic::codec::ProstCodec::default())
                .await
        }

        /// Relay a raw transaction
        pub async fn send_transaction(
            &mut self,
            request: impl tonic::IntoRequest<RawTransaction>,
        ) -> std::result::Result<tonic::Response<SendResponse>, tonic::Status> {
            self.ready().await?;
            let path = http::uri::PathAndQuery::from_static(
                "/cash.z.wallet.sdk.rpc.CompactTxStreamer/SendTransaction",
            );
            let req = Self::prepare(request, "SendTransaction");
            self.inner
                .unary(req, path, tonic::codec::ProstCodec::default())
                .await
        }

        /// Server version and chain info
        pub async fn get_lightd_info(
            &mut self,
            request: impl tonic::IntoRequest<Empty>,
        ) -> std::result::Result<tonic::Response<LightdInfo>, tonic::Status> {
            self.ready().await?;
            let path = http::uri::PathAndQuery::from_static(
                "/cash.z.wallet.sdk.rpc.CompactTxStreamer/GetLightdInfo",
            );
            let req = Self::prepare(request, "GetLightdInfo");
            self.inner
                .unary(req, path, tonic::codec::ProstCodec::default())
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_metadata_survives_reencode() {
        let block = CompactBlock {
            proto_version: 1,
            height: 419_200,
            hash: vec![7u8; 32],
            prev_hash: vec![6u8; 32],
            time: 1_540_779_337,
            header: Vec::new(),
            vtx: vec![CompactTx {
                index: 0,
                hash: vec![1u8; 32],
                fee: 0,
                spends: vec![CompactSaplingSpend { nf: vec![2u8; 32] }],
                outputs: Vec::new(),
                actions: Vec::new(),
            }],
            chain_metadata: Some(ChainMetadata {
                sapling_commitment_tree_size: 12,
                orchard_commitment_tree_size: 0,
            }),
        };

        let decoded = CompactBlock::decode(block.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.height, 419_200);
        assert_eq!(
            decoded.chain_metadata.map(|m| m.sapling_commitment_tree_size),
            Some(12)
        );
        assert_eq!(decoded.vtx[0].spends.len(), 1);
    }

    #[test]
    fn test_block_range_heights() {
        let range = BlockRange {
            start: Some(BlockId {
                height: 100,
                hash: Vec::new(),
            }),
            end: Some(BlockId {
                height: 105,
                hash: Vec::new(),
            }),
        };
        let decoded = BlockRange::decode(range.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.start.map(|b| b.height), Some(100));
        assert_eq!(decoded.end.map(|b| b.height), Some(105));
    }
}
