//! Wait Signals
//!
//! A [`WaitSignal`] releases every task waiting on a field when that field is
//! written, then immediately re-arms so later waiters block until the next
//! write.
//!
//! # How It Works
//!
//! The signal pairs a `tokio::sync::Notify` with two write counters:
//!
//! - `started` counts writes whose fan-out has begun,
//! - `released` holds the number of the latest write that reached its
//!   release step.
//!
//! A waiter targets the first write to begin after it was created, i.e.
//! `started + 1`, and resolves once `released` reaches that number. A watch
//! armed by an observer in the middle of a write therefore waits for the
//! following write. `notify_waiters` wakes every registered waiter and stores
//! no permit; a woken waiter whose target has not been released yet goes back
//! to sleep. A write landing between `watch()` and the first poll is not lost,
//! because the target is fixed when the future is created.
//!
//! A write whose release step never runs (an observer panicked) leaves its
//! waiters pending; the next write's release covers them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

pub(crate) struct WaitSignal {
    started: AtomicU64,
    released: AtomicU64,
    notify: Notify,
}

impl WaitSignal {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            released: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Mark the start of a write's fan-out and return its number.
    pub(crate) fn begin(&self) -> u64 {
        self.started.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Release every waiter targeting `write` or an earlier write.
    ///
    /// One call is one release event.
    pub(crate) fn release(&self, write: u64) {
        self.released.fetch_max(write, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// A future that resolves once the next write to begin after this call
    /// has been released.
    ///
    /// Dropping the future removes only its own waiter.
    pub(crate) fn wait(self: Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let target = self.started.load(Ordering::Acquire) + 1;

        async move {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                // Register before re-checking so a concurrent release cannot
                // slip between the check and the await.
                notified.as_mut().enable();

                if self.released.load(Ordering::Acquire) >= target {
                    return;
                }
                notified.await;
            }
        }
    }

    #[cfg(test)]
    fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }
}
