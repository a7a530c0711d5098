//! Cooperative cancellation for blocking queue waits.
//!
//! A [`CancelToken`] is an explicit stop signal shared between the thread
//! requesting the stop and the threads blocked inside
//! [`pop_cancellable`](crate::sync::handoff::HandoffQueue::pop_cancellable).
//! Cancelling wakes every registered waiter, so a blocked consumer observes
//! the signal promptly instead of on its next value.
//!
//! # Example
//!
//! ```
//! use baton::sync::cancel::CancelToken;
//! use baton::sync::handoff::{HandoffQueue, PopError};
//!
//! let queue = HandoffQueue::<u64>::new();
//! let token = CancelToken::new();
//!
//! let waiter = {
//!     let queue = queue.clone();
//!     let token = token.clone();
//!     std::thread::spawn(move || queue.pop_cancellable(&token))
//! };
//!
//! token.cancel();
//! assert_eq!(waiter.join().unwrap(), Err(PopError::Cancelled));
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::trace::{debug, trace};

/// Something a blocked wait can be woken through.
///
/// Implementations must lock the same mutex the waiter holds between its
/// cancellation check and its suspension before notifying; that ordering is
/// what rules out a lost wakeup.
pub(crate) trait WakeTarget: Send + Sync {
    fn wake_all(&self);
}

struct Watcher {
    id: u64,
    target: Weak<dyn WakeTarget>,
}

struct Inner {
    cancelled: AtomicBool,
    watchers: Mutex<Vec<Watcher>>,
    next_watch_id: AtomicU64,
}

/// Clonable cancellation signal observed by blocking waits.
///
/// Clones share the signal: cancelling any clone cancels them all.
/// Cancellation is one-way; a cancelled token never resets.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                watchers: Mutex::new(Vec::new()),
                next_watch_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns whether the token has been cancelled.
    ///
    /// Loop code checks this between iterations; blocked waits observe the
    /// token through [`cancel`](Self::cancel)'s wakeup instead.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Cancels the token and wakes every registered waiter.
    ///
    /// Idempotent; only the first call performs the wakeups.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::Relaxed) {
            return;
        }
        debug!("cancellation requested");

        // Snapshot under the registry lock, wake outside it. Waking locks
        // each target's own mutex, and nothing may hold the registry lock
        // while taking one of those.
        let targets: Vec<Arc<dyn WakeTarget>> = {
            let mut watchers = self
                .inner
                .watchers
                .lock()
                .expect("cancel registry mutex poisoned");
            watchers.retain(|watcher| watcher.target.strong_count() > 0);
            watchers
                .iter()
                .filter_map(|watcher| watcher.target.upgrade())
                .collect()
        };
        for target in targets {
            target.wake_all();
        }
    }

    /// Registers a wake target for the duration of the returned guard.
    pub(crate) fn watch(&self, target: Weak<dyn WakeTarget>) -> WatchGuard {
        let id = self.inner.next_watch_id.fetch_add(1, Ordering::Relaxed);
        let mut watchers = self
            .inner
            .watchers
            .lock()
            .expect("cancel registry mutex poisoned");
        watchers.push(Watcher { id, target });
        trace!(watchers = watchers.len(), "queue wait registered");
        drop(watchers);

        WatchGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }
}

/// Deregisters one queue wait when dropped.
pub(crate) struct WatchGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Ok(mut watchers) = self.inner.watchers.lock() {
            watchers.retain(|watcher| watcher.id != self.id);
        }
    }
}
