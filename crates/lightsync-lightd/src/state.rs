//! Sync state machine
//!
//! The engine owns exactly one [`SyncState`]. Every status change goes through
//! [`SyncState::transition`], which rejects edges the pass loop never takes.

use crate::{Error, Result};
use serde::Serialize;

/// Engine status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SyncStatus {
    /// Waiting for an explicit sync or the refresh timer
    #[default]
    Idle,
    /// One tip request in flight
    FetchingTip,
    /// One block-range stream in flight
    Streaming,
    /// Scanned height equals the remote tip
    Converged,
    /// Last pass failed; a retry is scheduled
    Error,
}

impl SyncStatus {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::FetchingTip => "Fetching Tip",
            Self::Streaming => "Streaming Blocks",
            Self::Converged => "Synced",
            Self::Error => "Error",
        }
    }

    /// Whether a new pass may begin from this status
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Idle | Self::Converged | Self::Error)
    }

    /// Whether `self -> next` is an edge of the pass loop
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Idle | Converged | Error, FetchingTip)
                | (FetchingTip, Converged | Streaming | Error | Idle)
                | (Streaming, Idle | FetchingTip | Error)
        )
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Heights and status owned by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    scanned_height: u64,
    target_height: u64,
    status: SyncStatus,
}

impl SyncState {
    /// Create state at the height the wallet reports after its checkpoint
    pub fn new(scanned_height: u64) -> Self {
        Self {
            scanned_height,
            target_height: scanned_height,
            status: SyncStatus::Idle,
        }
    }

    /// Current status
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Last height reported by the wallet
    pub fn scanned_height(&self) -> u64 {
        self.scanned_height
    }

    /// Tip height of the most recent plan
    pub fn target_height(&self) -> u64 {
        self.target_height
    }

    /// Move to `next`, returning the previous status
    pub fn transition(&mut self, next: SyncStatus) -> Result<SyncStatus> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }

    /// Set status without validation. Used only to recover from a rejected edge.
    pub(crate) fn force(&mut self, next: SyncStatus) {
        self.status = next;
    }

    /// Record the height the wallet reported
    pub fn record_scanned(&mut self, height: u64) {
        self.scanned_height = height;
    }

    /// Record the tip a plan was computed against
    pub fn set_target(&mut self, height: u64) {
        self.target_height = height;
    }
}
