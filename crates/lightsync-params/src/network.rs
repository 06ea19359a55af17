//! Zcash network definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
}

impl FromStr for NetworkType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Mainnet),
            "test" | "testnet" => Ok(Self::Testnet),
            other => Err(crate::Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Chain name as reported by lightwalletd ("main" or "test")
    pub chain_name: &'static str,
    /// Ticker shown next to amounts
    pub ticker: &'static str,
    /// Sapling activation height
    pub sapling_activation_height: u64,
    /// Default lightwalletd endpoint
    pub default_lightd_url: &'static str,
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            chain_name: "main",
            ticker: "ZEC",
            sapling_activation_height: 419_200,
            default_lightd_url: "https://mainnet.lightwalletd.com:9067",
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            chain_name: "test",
            ticker: "TAZ",
            sapling_activation_height: 280_000,
            default_lightd_url: "https://testnet.lightwalletd.com:9067",
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
        }
    }

    /// Check if Sapling is activated at given height
    pub const fn is_sapling_active(&self, height: u64) -> bool {
        height >= self.sapling_activation_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = Network::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.chain_name, "main");
        assert!(net.is_sapling_active(419_200));
        assert!(!net.is_sapling_active(419_199));
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("test".parse::<NetworkType>().unwrap(), NetworkType::Testnet);
        assert_eq!(" Mainnet ".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert!("regtest".parse::<NetworkType>().is_err());
    }
}
