//! Transaction submission
//!
//! Builds a transaction with the wallet, relays it once through the chain
//! source and publishes the refreshed balances whatever the outcome.

use crate::client::compute_txid;
use crate::notify::{Notifier, SyncNotification};
use crate::params::SaplingParams;
use crate::sink::{Balance, BuildTransaction, SharedSink, WalletScanSink};
use crate::source::ChainSource;
use crate::sync::SyncEngine;
use crate::{Error, Result};
use lightsync_params::Amount;
use std::sync::Arc;
use tracing::{error, info};

/// Accepted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Transaction id (hex, display order)
    pub txid: String,
    /// Serialized size in bytes
    pub size: usize,
    /// Recipient
    pub destination: String,
    /// Value sent
    pub amount: Amount,
    /// Balances after the broadcast
    pub balance: Balance,
}

/// Builds, signs and relays transactions
pub struct TransactionSubmitter<S, W> {
    source: Arc<S>,
    sink: SharedSink<W>,
    params: SaplingParams,
    consensus_branch_id: u32,
    notifier: Notifier,
}

impl<S, W> TransactionSubmitter<S, W>
where
    S: ChainSource,
    W: WalletScanSink,
{
    /// Create a submitter sharing `sink` and `notifier` with an engine
    pub fn new(
        source: Arc<S>,
        sink: SharedSink<W>,
        params: SaplingParams,
        consensus_branch_id: u32,
        notifier: Notifier,
    ) -> Self {
        Self {
            source,
            sink,
            params,
            consensus_branch_id,
            notifier,
        }
    }

    /// Send `amount` to `destination`.
    ///
    /// `ConstructionFailed` if the wallet cannot build the transaction (nothing
    /// is broadcast), `BroadcastRejected` if the network refuses it. Rejections
    /// are not retried.
    pub async fn submit(&self, destination: &str, amount: Amount) -> Result<SubmitReceipt> {
        if amount == Amount::ZERO {
            return Err(lightsync_params::Error::InvalidAmount(
                "amount must be greater than zero".to_string(),
            )
            .into());
        }
        info!("Sending {} to {}", amount, destination);

        let raw_tx = match self.build(destination, amount).await {
            Some(raw_tx) => raw_tx,
            None => {
                let err = Error::ConstructionFailed;
                error!("Failed to create transaction");
                self.publish_balance().await;
                self.notifier.error(&err);
                return Err(err);
            }
        };

        let txid = compute_txid(&raw_tx);
        let size = raw_tx.len();
        info!("Sending transaction {} ({} bytes)", txid, size);

        let response = self.source.broadcast_transaction(raw_tx).await;
        let balance = self.publish_balance().await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to relay transaction {}: {}", txid, e);
                self.notifier.error(&e);
                return Err(e);
            }
        };

        if response.is_rejected() {
            let err = Error::BroadcastRejected {
                code: response.error_code.unwrap_or_default(),
                message: response.error_message.unwrap_or_default(),
            };
            error!("Transaction {} rejected: {}", txid, err);
            self.notifier.error(&err);
            return Err(err);
        }

        info!(event = "transaction_submitted", txid = %txid, "Sent transaction");
        self.notifier.publish(SyncNotification::TransactionSubmitted {
            txid: txid.clone(),
        });
        Ok(SubmitReceipt {
            txid,
            size,
            destination: destination.to_string(),
            amount,
            balance,
        })
    }

    /// Build on the blocking pool; proving is CPU-bound.
    async fn build(&self, destination: &str, amount: Amount) -> Option<Vec<u8>> {
        let sink = Arc::clone(&self.sink);
        let params = self.params.clone();
        let destination = destination.to_string();
        let consensus_branch_id = self.consensus_branch_id;

        let built = tokio::task::spawn_blocking(move || {
            let request = BuildTransaction {
                consensus_branch_id,
                spend_params: params.spend(),
                output_params: params.output(),
                destination: &destination,
                amount,
            };
            sink.blocking_lock().build_transaction(&request)
        })
        .await;

        match built {
            Ok(raw_tx) => raw_tx,
            Err(e) => {
                error!("Transaction builder task failed: {}", e);
                None
            }
        }
    }

    async fn publish_balance(&self) -> Balance {
        let balance = self.sink.lock().await.balances();
        self.notifier.balance(balance);
        balance
    }
}

impl<S, W> SyncEngine<S, W>
where
    S: ChainSource,
    W: WalletScanSink,
{
    /// Submitter sharing this engine's source, wallet and notifications
    pub fn submitter(&self, params: SaplingParams) -> TransactionSubmitter<S, W> {
        TransactionSubmitter::new(
            Arc::clone(self.source()),
            Arc::clone(self.sink()),
            params,
            self.config().consensus_branch_id,
            self.notifier().clone(),
        )
    }
}
