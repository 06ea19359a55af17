//! Shutdown signal shared by the engine handle and its task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Clonable shutdown flag with async wake-up
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    set: AtomicBool,
    wake: Notify,
}

impl CancelToken {
    /// Unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`CancelToken::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.shared.set.load(Ordering::Acquire)
    }

    /// Set the flag and wake every waiter. Repeated calls are no-ops.
    pub fn cancel(&self) {
        if !self.shared.set.swap(true, Ordering::AcqRel) {
            self.shared.wake.notify_waiters();
        }
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let wake = self.shared.wake.notified();
        tokio::pin!(wake);
        // Register first: a cancel between the check and the await still wakes us.
        wake.as_mut().enable();
        if !self.is_cancelled() {
            wake.await;
        }
    }
}
