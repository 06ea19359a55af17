//! Cancellable one-shot timer for delayed passes

use std::time::Duration;
use tokio::time::Instant;

/// One-shot pass timer owned by the engine task.
///
/// At most one deadline is pending. [`PassTimer::fired`] never resolves while
/// nothing is scheduled, so it can sit in a `select!` unconditionally.
#[derive(Debug, Default)]
pub struct PassTimer {
    deadline: Option<Instant>,
}

impl PassTimer {
    /// Create an unscheduled timer
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Schedule the next pass after `delay`, replacing any pending deadline
    pub fn schedule(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    /// Drop the pending deadline. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Whether a deadline is pending
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Pending deadline
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolve once the pending deadline passes, clearing it
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
