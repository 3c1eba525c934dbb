//! Wake signal that lets control operations cut a loop's wait short.
//!
//! The signal is binary: any number of `set()` calls before the next wait
//! collapse into one wake. Winning a wait clears it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why a wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Signaled,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct WakeSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Wait until the signal is set, `timeout` elapses, or `cancel` fires.
    pub async fn wait(&self, timeout: Duration, cancel: &CancellationToken) -> WakeReason {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            if cancel.is_cancelled() {
                return WakeReason::Cancelled;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.take() {
                return WakeReason::Signaled;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WakeReason::Cancelled,
                _ = &mut notified => continue,
                _ = &mut sleep => return WakeReason::TimedOut,
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns false when cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
