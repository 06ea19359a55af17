//! Trusted checkpoints used to seed a wallet without scanning from genesis

use crate::network::NetworkType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hex encoding of an empty Sapling commitment tree
const EMPTY_SAPLING_TREE: &str = "000000";

/// A blockchain checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Block height
    pub height: u64,
    /// Block hash (hex, display byte order)
    pub hash: String,
    /// Serialized Sapling commitment tree at this height (hex)
    #[serde(alias = "sapling_tree", alias = "saplingTree")]
    pub tree_state: String,
}

impl Checkpoint {
    /// Parse a single checkpoint from JSON
    ///
    /// Accepts the lightwalletd `TreeState` field names (`saplingTree`) as well.
    pub fn from_json(json: &str) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(json)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Load a checkpoint from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Check the encodings of the hash and tree state
    pub fn validate(&self) -> Result<()> {
        let hash = self.hash_bytes()?;
        if hash.len() != 32 {
            return Err(self.invalid(format!("hash is {} bytes, expected 32", hash.len())));
        }
        if self.tree_state.is_empty() {
            return Err(self.invalid("tree state is empty".to_string()));
        }
        self.tree_state_bytes()?;
        Ok(())
    }

    /// Decoded block hash
    pub fn hash_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.hash).map_err(|e| self.invalid(format!("hash is not hex: {}", e)))
    }

    /// Decoded tree state
    pub fn tree_state_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.tree_state)
            .map_err(|e| self.invalid(format!("tree state is not hex: {}", e)))
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidCheckpoint {
            height: self.height,
            reason,
        }
    }
}

/// List of checkpoints
#[derive(Debug, Clone)]
pub struct CheckpointList {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointList {
    /// Create a new checkpoint list
    pub fn new(checkpoints: Vec<Checkpoint>) -> Self {
        let mut cp = Self { checkpoints };
        cp.sort();
        cp
    }

    /// Get mainnet checkpoints
    pub fn mainnet() -> Self {
        Self::new(vec![Checkpoint {
            height: 419_200,
            hash: "00000000025a57200d898ac7f21e26bf29028bbe96ec46e05b2c17cc9db9e4f3".to_string(),
            tree_state: EMPTY_SAPLING_TREE.to_string(),
        }])
    }

    /// Get testnet checkpoints
    pub fn testnet() -> Self {
        Self::new(vec![Checkpoint {
            height: 280_000,
            hash: "000420e7fcc3a49d729479fb0b560dd7b8617b178a08e9e389620a9d1dd6361a".to_string(),
            tree_state: EMPTY_SAPLING_TREE.to_string(),
        }])
    }

    /// Get bundled checkpoints by network type
    pub fn for_network(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
        }
    }

    /// Load a JSON array of checkpoints, validating each entry
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let checkpoints: Vec<Checkpoint> = serde_json::from_str(&raw)?;
        for cp in &checkpoints {
            cp.validate()?;
        }
        Ok(Self::new(checkpoints))
    }

    /// Sort checkpoints by height
    fn sort(&mut self) {
        self.checkpoints.sort_by_key(|cp| cp.height);
    }

    /// Get checkpoint at or before given height
    pub fn checkpoint_at_height(&self, height: u64) -> Result<&Checkpoint> {
        self.checkpoints
            .iter()
            .rev()
            .find(|cp| cp.height <= height)
            .ok_or(Error::CheckpointNotFound(height))
    }

    /// Get all checkpoints
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Get latest checkpoint
    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Get checkpoint count
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}
