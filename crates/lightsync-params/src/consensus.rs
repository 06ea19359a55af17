//! Consensus and sync timing constants

use std::time::Duration;

/// Sapling consensus branch id used when building transactions
pub const SAPLING_CONSENSUS_BRANCH_ID: u32 = 0x76b8_09bb;

/// Maximum number of blocks requested from lightwalletd in one stream
pub const DEFAULT_BATCH_SIZE: u64 = 1_000;

/// Delay between sync passes once the wallet has caught up (or failed)
pub const CHAIN_REFRESH_INTERVAL: Duration = Duration::from_millis(60 * 1_000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sapling_branch_id() {
        assert_eq!(SAPLING_CONSENSUS_BRANCH_ID, 0x76b809bb);
    }

    #[test]
    fn test_sync_constants() {
        assert_eq!(DEFAULT_BATCH_SIZE, 1000);
        assert_eq!(CHAIN_REFRESH_INTERVAL.as_millis(), 60_000);
    }
}
