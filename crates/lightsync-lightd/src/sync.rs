//! Sync engine
//!
//! Drives fetch → scan → advance against a [`ChainSource`] and a
//! [`WalletScanSink`]:
//! - one tip request per pass, then at most one block-range stream
//! - blocks forwarded to the wallet in delivery order; a rejected block is
//!   reported and the stream keeps draining
//! - backlog drains pass after pass; a caught-up, converged or failed pass
//!   schedules the next one after the refresh interval
//! - a single task owns the state, the timer and the in-flight stream

use crate::cancel::CancelToken;
use crate::notify::{Notifier, SyncNotification};
use crate::planner::{plan_with_batch_size, BlockRangeRequest};
use crate::progress::SyncProgress;
use crate::sink::{SharedSink, WalletScanSink};
use crate::source::{ChainSource, StreamEvent, StreamStatus};
use crate::state::{SyncState, SyncStatus};
use crate::timer::PassTimer;
use crate::{Error, Result};
use lightsync_params::{
    Checkpoint, CHAIN_REFRESH_INTERVAL, DEFAULT_BATCH_SIZE, SAPLING_CONSENSUS_BRANCH_ID,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Environment variable overriding [`SyncConfig::batch_size`]
pub const ENV_BATCH_SIZE: &str = "LIGHTSYNC_BATCH_SIZE";
/// Environment variable overriding [`SyncConfig::refresh_interval`] (milliseconds)
pub const ENV_REFRESH_INTERVAL_MS: &str = "LIGHTSYNC_REFRESH_INTERVAL_MS";
/// Environment variable overriding [`SyncConfig::stream_buffer`]
pub const ENV_STREAM_BUFFER: &str = "LIGHTSYNC_STREAM_BUFFER";

/// Sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum heights per block-range request
    pub batch_size: u64,
    /// Delay before the next pass once caught up, converged or failed
    pub refresh_interval: Duration,
    /// Block stream channel capacity
    pub stream_buffer: usize,
    /// Consensus branch id passed to transaction construction
    pub consensus_branch_id: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            refresh_interval: CHAIN_REFRESH_INTERVAL,
            stream_buffer: 64,
            consensus_branch_id: SAPLING_CONSENSUS_BRANCH_ID,
        }
    }
}

impl SyncConfig {
    /// Defaults with `LIGHTSYNC_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, value)))
        }

        let mut config = Self::default();
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            config.batch_size = parse(ENV_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_REFRESH_INTERVAL_MS) {
            let millis = parse(ENV_REFRESH_INTERVAL_MS, &value)?;
            config.refresh_interval = Duration::from_millis(millis);
        }
        if let Some(value) = lookup(ENV_STREAM_BUFFER) {
            config.stream_buffer = parse(ENV_STREAM_BUFFER, &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.stream_buffer == 0 {
            return Err(Error::Config("stream_buffer must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// What one streamed batch did
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Requested range
    pub range: BlockRangeRequest,
    /// Tip observed at the start of the pass
    pub tip_height: u64,
    /// Blocks delivered by the stream
    pub blocks_received: u64,
    /// Blocks the wallet rejected
    pub ingest_failures: u64,
    /// Height the wallet reported after the stream
    pub scanned_height: u64,
    /// Terminal stream status
    pub status: StreamStatus,
}

impl BatchReport {
    /// Whether the wallet stopped short of the range end
    pub fn terminated_early(&self) -> bool {
        self.scanned_height != self.range.end_height
    }

    /// Whether any block failed or the stream ended early
    pub fn is_degraded(&self) -> bool {
        self.ingest_failures > 0 || self.terminated_early() || !self.status.is_ok()
    }
}

/// Result of one pass
#[derive(Debug)]
pub enum PassOutcome {
    /// Batch advanced the wallet and blocks remain; run the next pass now
    Continue(BatchReport),
    /// Batch reached the tip of the pass
    CaughtUp(BatchReport),
    /// Batch completed without advancing the wallet
    Stalled(BatchReport),
    /// Wallet already at the tip
    Converged {
        /// Tip height
        tip_height: u64,
    },
    /// Tip fetch, planning or stream failed
    Failed(Error),
    /// Shutdown interrupted the pass
    Cancelled,
}

impl PassOutcome {
    /// Delay before the next pass; `None` stops the loop
    pub fn next_delay(&self, refresh_interval: Duration) -> Option<Duration> {
        match self {
            Self::Continue(_) => Some(Duration::ZERO),
            Self::CaughtUp(_) | Self::Stalled(_) | Self::Converged { .. } | Self::Failed(_) => {
                Some(refresh_interval)
            }
            Self::Cancelled => None,
        }
    }

    /// Batch report, if the pass streamed
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Continue(report) | Self::CaughtUp(report) | Self::Stalled(report) => Some(report),
            _ => None,
        }
    }
}

enum Command {
    Sync,
}

/// Sync engine
pub struct SyncEngine<S, W> {
    source: Arc<S>,
    sink: SharedSink<W>,
    config: SyncConfig,
    state: SyncState,
    notifier: Notifier,
    progress: SyncProgress,
    cancel: CancelToken,
}

#[allow(dead_code)]
fn _assert_sync_handle_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SyncHandle>();
}

impl<S, W> SyncEngine<S, W>
where
    S: ChainSource,
    W: WalletScanSink,
{
    /// Create an engine and apply `checkpoint` to the wallet.
    ///
    /// Fails with `CheckpointInvalid` if the wallet refuses the checkpoint.
    pub async fn new(
        source: Arc<S>,
        sink: SharedSink<W>,
        checkpoint: &Checkpoint,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (applied, scanned) = {
            let mut wallet = sink.lock().await;
            let applied = wallet.apply_checkpoint(checkpoint);
            (applied, wallet.last_scanned_height())
        };
        if !applied {
            error!(
                event = "checkpoint_rejected",
                height = checkpoint.height,
                "Invalid checkpoint data"
            );
            return Err(Error::CheckpointInvalid {
                height: checkpoint.height,
            });
        }
        info!(
            event = "checkpoint_applied",
            height = checkpoint.height,
            scanned_height = scanned,
            "Checkpoint applied"
        );

        let progress = SyncProgress::new();
        progress.start(scanned);

        Ok(Self {
            source,
            sink,
            config,
            state: SyncState::new(scanned),
            notifier: Notifier::default(),
            progress,
            cancel: CancelToken::new(),
        })
    }

    /// Subscribe to notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifier.subscribe()
    }

    /// Notifier shared with the transaction submitter
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Progress tracker
    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    /// Engine state
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Chain source
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Shared wallet
    pub fn sink(&self) -> &SharedSink<W> {
        &self.sink
    }

    /// Token that interrupts [`SyncEngine::sync_once`]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Publish the wallet address and balances
    pub async fn publish_wallet_loaded(&self) {
        let (address, balance) = match self.wallet().await {
            Some(wallet) => (wallet.current_address(), wallet.balances()),
            None => return,
        };
        info!(event = "wallet_loaded", address = %address, "Wallet ready");
        self.notifier
            .publish(SyncNotification::AddressReady { address });
        self.notifier.balance(balance);
    }

    /// Publish the wallet address and balances, then move the engine onto
    /// its own task. Passes start on [`SyncHandle::sync`].
    pub async fn start(self) -> SyncHandle {
        self.publish_wallet_loaded().await;

        let (commands, rx) = mpsc::channel(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let handle = SyncHandle {
            commands,
            cancel: self.cancel.clone(),
            in_flight: Arc::clone(&in_flight),
            notifier: self.notifier.clone(),
            progress: self.progress.clone(),
            task: tokio::spawn(self.run(rx, in_flight)),
        };
        info!(event = "sync_engine_started", "Sync engine started");
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, in_flight: Arc<AtomicBool>) {
        let mut timer = PassTimer::new();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::Sync) => {
                        if timer.cancel() {
                            debug!("Explicit sync replaced the scheduled pass");
                        }
                    }
                    None => {
                        debug!("All sync handles dropped");
                        break;
                    }
                },
                _ = timer.fired() => {
                    in_flight.store(true, Ordering::Release);
                }
            }

            let next = self.run_passes().await;
            in_flight.store(false, Ordering::Release);
            match next {
                Some(delay) => {
                    debug!("Next pass in {:?}", delay);
                    timer.schedule(delay);
                }
                None => break,
            }
        }
        timer.cancel();
        info!(
            event = "sync_engine_stopped",
            scanned_height = self.state.scanned_height(),
            "Sync engine stopped"
        );
    }

    /// Run passes back to back until one asks for a delay
    async fn run_passes(&mut self) -> Option<Duration> {
        loop {
            let outcome = self.sync_once().await;
            if let PassOutcome::Continue(_) = outcome {
                continue;
            }
            return outcome.next_delay(self.config.refresh_interval);
        }
    }

    /// Run one pass: fetch the tip, plan, stream and scan one batch.
    ///
    /// Errors are reported through notifications and returned in the outcome;
    /// the caller decides when to run the next pass.
    pub async fn sync_once(&mut self) -> PassOutcome {
        self.set_status(SyncStatus::FetchingTip);

        let tip = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.cancelled(),
            tip = self.source.latest_tip() => tip,
        };
        let tip = match tip {
            Ok(tip) => tip.height,
            Err(e) => {
                error!("Error fetching latest block: {}", e);
                return self.fail(e);
            }
        };

        let scanned = self.wallet().await.map(|wallet| wallet.last_scanned_height());
        let Some(scanned) = scanned else {
            return self.cancelled();
        };
        self.state.record_scanned(scanned);
        debug!("Latest block: {}", tip);

        let range = match plan_with_batch_size(scanned, tip, self.config.batch_size) {
            Ok(Some(range)) => range,
            Ok(None) => {
                info!(event = "sync_converged", height = tip, "No new blocks");
                self.state.set_target(tip);
                self.progress.set_target(tip);
                self.progress.set_current(scanned);
                self.set_status(SyncStatus::Converged);
                return PassOutcome::Converged { tip_height: tip };
            }
            Err(e) => {
                error!("{}", e);
                return self.fail(e);
            }
        };

        self.state.set_target(tip);
        self.progress.set_target(tip);
        self.set_status(SyncStatus::Streaming);
        debug!("Requesting blocks in range {}", range);

        let report = match self.stream_batch(range, tip).await {
            Some(report) => report,
            None => return self.cancelled(),
        };

        if let Some(e) = report.status.to_error() {
            error!("Error while streaming blocks: {}", e);
            return self.fail(e);
        }

        if report.scanned_height >= tip {
            info!(
                event = "sync_caught_up",
                height = report.scanned_height,
                "Finished syncing"
            );
            self.set_status(SyncStatus::Idle);
            return PassOutcome::CaughtUp(report);
        }

        if report.scanned_height <= scanned {
            warn!(
                event = "sync_stalled",
                height = scanned,
                "Batch {} did not advance the wallet",
                range
            );
            self.set_status(SyncStatus::Idle);
            return PassOutcome::Stalled(report);
        }

        PassOutcome::Continue(report)
    }

    /// Stream one batch into the wallet. `None` if cancelled mid-stream.
    async fn stream_batch(&mut self, range: BlockRangeRequest, tip: u64) -> Option<BatchReport> {
        let started = Instant::now();
        let mut stream = self.source.stream_blocks(range, self.config.stream_buffer);
        let mut blocks_received = 0u64;
        let mut ingest_failures = 0u64;

        let status = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Dropping block stream {} on shutdown", range);
                    return None;
                }
                event = stream.next() => event,
            };

            match event {
                Some(StreamEvent::Block(block)) => {
                    let index = blocks_received;
                    blocks_received += 1;
                    let scanned = self
                        .wallet()
                        .await
                        .map(|mut wallet| wallet.ingest_block(block.as_bytes()))?;
                    if !scanned {
                        ingest_failures += 1;
                        let err = Error::ScanIngestFailure {
                            batch_start: range.start_height,
                            index,
                        };
                        warn!("Failed to scan block: {}", err);
                        self.notifier.error(&err);
                    }
                }
                Some(StreamEvent::Status(status)) => break status,
                None => {
                    break StreamStatus::error(
                        tonic::Code::Unknown,
                        "stream closed without status",
                    )
                }
            }
        };
        drop(stream);

        if let Some(metadata) = &status.metadata {
            debug!("Received metadata: {:?}", metadata);
        }
        if !status.is_ok() {
            error!("Error code: {:?} \"{}\"", status.code, status.details);
        }

        let (scanned_height, balance) = {
            let wallet = self.wallet().await?;
            (wallet.last_scanned_height(), wallet.balances())
        };
        self.state.record_scanned(scanned_height);

        if scanned_height < range.end_height {
            let err = Error::StreamEarlyTermination {
                expected: range.end_height,
                scanned: scanned_height,
            };
            warn!("Block stream finished before expected end height: {}", err);
            self.notifier.error(&err);
        }

        info!(
            event = "batch_scanned",
            start = range.start_height,
            end = range.end_height,
            blocks = blocks_received,
            failures = ingest_failures,
            "Scanned to height: {}",
            scanned_height
        );
        self.notifier.balance(balance);
        self.notifier.publish(SyncNotification::SyncStatusUpdated {
            scanned_height,
            tip_height: tip,
        });
        self.progress
            .record_batch(scanned_height, ingest_failures, started.elapsed());

        Some(BatchReport {
            range,
            tip_height: tip,
            blocks_received,
            ingest_failures,
            scanned_height,
            status,
        })
    }

    /// Lock the wallet. `None` if the engine is cancelled while waiting.
    async fn wallet(&self) -> Option<MutexGuard<'_, W>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            wallet = self.sink.lock() => Some(wallet),
        }
    }

    fn fail(&mut self, err: Error) -> PassOutcome {
        self.set_status(SyncStatus::Error);
        self.notifier.error(&err);
        PassOutcome::Failed(err)
    }

    fn cancelled(&mut self) -> PassOutcome {
        self.set_status(SyncStatus::Idle);
        PassOutcome::Cancelled
    }

    fn set_status(&mut self, next: SyncStatus) {
        match self.state.transition(next) {
            Ok(previous) => debug!(from = %previous, to = %next, "Sync status"),
            Err(e) => {
                error!("{}", e);
                self.state.force(next);
            }
        }
        self.progress.set_status(next);
        self.notifier.status(next);
    }
}

/// Handle to a running engine
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancelToken,
    in_flight: Arc<AtomicBool>,
    notifier: Notifier,
    progress: SyncProgress,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Request a pass now, cancelling any scheduled one.
    ///
    /// Returns `false` without doing anything if a pass is already requested
    /// or running.
    pub fn sync(&self) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Err(Error::EngineStopped);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress");
            return Ok(false);
        }
        match self.commands.try_send(Command::Sync) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.store(false, Ordering::Release);
                Err(Error::EngineStopped)
            }
        }
    }

    /// Whether a pass is requested or running
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribe to notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifier.subscribe()
    }

    /// Progress tracker
    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    /// Stop the engine: cancel the timer and any in-flight stream, then wait
    /// for the task to exit. The wallet keeps whatever it last scanned.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.map_err(|e| {
            error!("Sync task failed: {}", e);
            Error::EngineStopped
        })
    }
}
