use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counter that releases every waiter once it reaches zero.
///
/// The runner sizes it to `1 + signal handlers` and hands one [`BarrierGuard`]
/// to each tracked task, so a task that panics or is aborted still counts down.
#[derive(Debug)]
pub struct CountdownBarrier {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CountdownBarrier {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        })
    }

    /// Decrement by one. Extra calls past zero are ignored.
    pub fn count_down(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev {
            Ok(1) => self.notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("count_down on an already released barrier"),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Suspend until the count reaches zero. Returns immediately if it already has.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a release in between is not lost.
            notified.as_mut().enable();

            if self.is_released() {
                return;
            }
            notified.await;
        }
    }

    /// A guard that counts down exactly once, when dropped.
    pub fn guard(self: &Arc<Self>) -> BarrierGuard {
        BarrierGuard {
            barrier: Arc::clone(self),
        }
    }
}

/// Counts its barrier down on drop.
#[derive(Debug)]
pub struct BarrierGuard {
    barrier: Arc<CountdownBarrier>,
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.barrier.count_down();
    }
}
