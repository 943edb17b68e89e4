//! One-shot readiness gate.
//!
//! The link state machine opens the gate the first time the station obtains an address;
//! capture setup waits on it. The gate is an atomic flag plus a [`Notify`]. It has two
//! states, closed and open, and is never reset once open.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One-shot signal coordinating waiters with a single readiness event.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    signaled: AtomicBool,
    notify: Notify,
}

impl ReadinessGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate and wake every waiter.
    ///
    /// Returns `true` only for the call that actually opened it; later calls are no-ops.
    pub fn signal(&self) -> bool {
        if self.signaled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    /// Whether the gate has been opened.
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Suspend until the gate is open. Returns immediately if it already is.
    pub async fn wait(&self) {
        if self.is_signaled() {
            return;
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before re-checking so a signal between the two cannot be missed.
        notified.as_mut().enable();
        if self.is_signaled() {
            return;
        }
        notified.await;
    }

    /// Block the current thread until the gate is open.
    ///
    /// For plain threads only; inside a Tokio runtime use [`ReadinessGate::wait`].
    pub fn wait_blocking(&self) {
        futures::executor::block_on(self.wait());
    }
}
