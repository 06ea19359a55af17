//! Batch planning
//!
//! Computes the next inclusive height range to request. The block at the
//! scanned height is requested again so the wallet sees the anchor it last
//! committed; wallets treat that re-delivery as a no-op.

use crate::{Error, Result};
use lightsync_params::DEFAULT_BATCH_SIZE;
use serde::Serialize;

/// Inclusive height range requested from the chain source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockRangeRequest {
    /// First height (inclusive)
    pub start_height: u64,
    /// Last height (inclusive)
    pub end_height: u64,
}

impl BlockRangeRequest {
    /// Number of heights covered
    pub fn len(&self) -> u64 {
        self.end_height - self.start_height + 1
    }

    /// Always false: a range covers at least one height
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `height` falls inside the range
    pub fn contains(&self, height: u64) -> bool {
        (self.start_height..=self.end_height).contains(&height)
    }
}

impl std::fmt::Display for BlockRangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start_height, self.end_height)
    }
}

/// Plan the next batch with the default batch size
pub fn plan(scanned_height: u64, tip_height: u64) -> Result<Option<BlockRangeRequest>> {
    plan_with_batch_size(scanned_height, tip_height, DEFAULT_BATCH_SIZE)
}

/// Plan the next batch.
///
/// Returns `None` when the wallet is at the tip and `TipRegression` when the
/// tip is below the scanned height.
pub fn plan_with_batch_size(
    scanned_height: u64,
    tip_height: u64,
    batch_size: u64,
) -> Result<Option<BlockRangeRequest>> {
    if batch_size == 0 {
        return Err(Error::Config("batch size must be at least 1".to_string()));
    }
    if tip_height < scanned_height {
        return Err(Error::TipRegression {
            scanned: scanned_height,
            tip: tip_height,
        });
    }
    if tip_height == scanned_height {
        return Ok(None);
    }

    let start_height = scanned_height;
    let end_height = tip_height.min(start_height.saturating_add(batch_size - 1));
    Ok(Some(BlockRangeRequest {
        start_height,
        end_height,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_caught_up() {
        assert_eq!(plan(2_500, 2_500).unwrap(), None);
        assert_eq!(plan(0, 0).unwrap(), None);
    }

    #[test]
    fn test_full_batch() {
        let range = plan(0, 2_500).unwrap().unwrap();
        assert_eq!(range.start_height, 0);
        assert_eq!(range.end_height, 999);
        assert_eq!(range.len(), 1_000);
        assert_eq!(range.to_string(), "[0, 999]");
    }

    #[test]
    fn test_short_batch() {
        let range = plan(100, 105).unwrap().unwrap();
        assert_eq!(
            range,
            BlockRangeRequest {
                start_height: 100,
                end_height: 105
            }
        );
        assert!(range.contains(103));
        assert!(!range.contains(106));
    }

    #[test]
    fn test_tip_regression() {
        let err = plan(50, 40).unwrap_err();
        assert!(matches!(err, Error::TipRegression { scanned: 50, tip: 40 }));
    }

    #[test]
    fn test_zero_batch_rejected() {
        assert!(matches!(
            plan_with_batch_size(0, 10, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_near_u64_max() {
        let range = plan_with_batch_size(u64::MAX - 5, u64::MAX, 1_000)
            .unwrap()
            .unwrap();
        assert_eq!(range.end_height, u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_plan_bounds(scanned in 0u64..10_000_000, ahead in 0u64..100_000) {
            let tip = scanned + ahead;
            match plan(scanned, tip).unwrap() {
                None => prop_assert_eq!(scanned, tip),
                Some(range) => {
                    prop_assert!(scanned != tip);
                    prop_assert_eq!(range.start_height, scanned);
                    prop_assert_eq!(range.end_height, tip.min(scanned + 999));
                    prop_assert!(range.end_height >= range.start_height);
                    prop_assert!(range.len() <= 1_000);
                }
            }
        }

        #[test]
        fn prop_plan_is_deterministic(scanned in 0u64..1_000_000, tip in 0u64..1_000_000) {
            let first = plan(scanned, tip);
            let second = plan(scanned, tip);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(Error::TipRegression { .. }), Err(Error::TipRegression { .. })) => {
                    prop_assert!(tip < scanned)
                }
                _ => prop_assert!(false, "plan results diverged"),
            }
        }

        #[test]
        fn prop_batch_size_respected(
            scanned in 0u64..1_000_000,
            ahead in 1u64..50_000,
            batch in 1u64..5_000,
        ) {
            let range = plan_with_batch_size(scanned, scanned + ahead, batch)
                .unwrap()
                .unwrap();
            prop_assert!(range.len() <= batch);
            prop_assert!(range.end_height <= scanned + ahead);
        }
    }
}
