//! Publish/subscribe notifications for sync and submission events

use crate::error::{Error, ErrorCode};
use crate::sink::Balance;
use crate::state::SyncStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default notification channel capacity
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Event published by the engine and the submitter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncNotification {
    /// Balances after a scan advance or a submission
    BalanceUpdated(Balance),
    /// Heights after a batch
    SyncStatusUpdated {
        /// Height reported by the wallet
        scanned_height: u64,
        /// Tip observed at the start of the pass
        tip_height: u64,
    },
    /// Wallet address, published once on start
    AddressReady {
        /// Receiving address
        address: String,
    },
    /// Engine status transition
    StatusChanged {
        /// New status
        status: SyncStatus,
    },
    /// Transaction accepted by the network
    TransactionSubmitted {
        /// Transaction id (hex, display order)
        txid: String,
    },
    /// Human-readable error report
    Error {
        /// Taxonomy code
        code: ErrorCode,
        /// Message
        message: String,
    },
}

impl SyncNotification {
    /// Build an error notification
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Broadcast fan-out for [`SyncNotification`]s.
///
/// Publishing never fails: with no subscribers the event is dropped, and a
/// slow subscriber observes `Lagged` rather than stalling the engine.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<SyncNotification>,
}

impl Notifier {
    /// Create a notifier with room for `capacity` undelivered events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New subscription; sees events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.tx.subscribe()
    }

    /// Publish one event
    pub fn publish(&self, notification: SyncNotification) {
        trace!(?notification, "publish");
        let _ = self.tx.send(notification);
    }

    /// Publish balances
    pub fn balance(&self, balance: Balance) {
        self.publish(SyncNotification::BalanceUpdated(balance));
    }

    /// Publish an error report
    pub fn error(&self, err: &Error) {
        self.publish(SyncNotification::from_error(err));
    }

    /// Publish a status change
    pub fn status(&self, status: SyncStatus) {
        self.publish(SyncNotification::StatusChanged { status });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(NOTIFICATION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out() {
        let notifier = Notifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.balance(Balance {
            total: 10,
            verified: 5,
        });

        let expected = SyncNotification::BalanceUpdated(Balance {
            total: 10,
            verified: 5,
        });
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(1);
        notifier.status(SyncStatus::FetchingTip);
    }

    #[test]
    fn test_error_notification() {
        let notification =
            SyncNotification::from_error(&Error::TipRegression { scanned: 50, tip: 40 });
        assert_eq!(
            notification,
            SyncNotification::Error {
                code: ErrorCode::TipRegression,
                message: "Remote tip 40 is below scanned height 50".to_string(),
            }
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(SyncNotification::SyncStatusUpdated {
            scanned_height: 1_000,
            tip_height: 2_500,
        })
        .unwrap();
        assert_eq!(json["event"], "sync_status_updated");
        assert_eq!(json["scanned_height"], 1_000);
    }
}
