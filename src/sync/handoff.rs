//! Blocking FIFO queue for handing values between threads.
//!
//! A mutex-and-condvar queue with unbounded buffering, a close handshake
//! for end-of-stream, and cooperative cancellation of blocked removals.
//!
//! # Overview
//!
//! - [`HandoffQueue`] - clonable handle; every clone operates on one shared buffer
//! - [`push`](HandoffQueue::push) never blocks; [`pop`](HandoffQueue::pop)
//!   blocks until a value or [`close`](HandoffQueue::close) arrives
//! - [`PopError::Exhausted`] - the queue closed and drained (the clean end)
//! - [`PopError::Cancelled`] - a [`CancelToken`] stopped the wait
//!
//! The buffer and the closed flag live under a single mutex; there is no
//! lock-free path. A value wakes one waiter, closing wakes them all, since
//! completion changes the exit condition for every blocked thread.
//!
//! # Example
//!
//! ```
//! use baton::sync::handoff::HandoffQueue;
//!
//! let queue = HandoffQueue::new();
//! let worker = queue.clone();
//!
//! let consumer = std::thread::spawn(move || {
//!     let mut received = Vec::new();
//!     while let Ok(value) = worker.pop() {
//!         received.push(value);
//!     }
//!     received
//! });
//!
//! queue.push(1);
//! queue.push(2);
//! queue.close();
//!
//! assert_eq!(consumer.join().unwrap(), vec![1, 2]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use crate::sync::cancel::{CancelToken, WakeTarget};
use crate::trace::{debug, warn};

/// Error returned by blocking removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    /// The queue was closed and every buffered value has been taken.
    #[error("queue exhausted")]
    Exhausted,
    /// The wait observed a cancelled token.
    #[error("wait cancelled")]
    Cancelled,
}

/// Buffer contents and the completion flag, guarded together.
struct State<T> {
    items: VecDeque<T>,
    /// Set once by [`HandoffQueue::close`]; never reset.
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Shared<T> {
    fn lock_state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect("handoff queue mutex poisoned")
    }
}

impl<T: Send> WakeTarget for Shared<T> {
    fn wake_all(&self) {
        // Passing through the mutex means a waiter between its cancellation
        // check and its suspension cannot miss the signal.
        drop(self.lock_state());
        self.available.notify_all();
    }
}

/// Handle to a shared blocking FIFO queue.
///
/// Cloning is cheap and yields another handle to the same buffer; the queue
/// is dropped when the last handle goes away. All methods take `&self`, so a
/// single handle can also be shared by reference across scoped threads.
pub struct HandoffQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T> {
    /// Creates an empty open queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Appends a value at the tail and wakes one waiter.
    ///
    /// Never blocks and never fails; the buffer is unbounded. Pushing after
    /// [`close`](Self::close) still delivers the value, though it usually
    /// means the producing side kept running past its handshake.
    pub fn push(&self, value: T) {
        let mut state = self.shared.lock_state();
        if state.closed {
            warn!("push on a closed queue");
        }
        state.items.push_back(value);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Removes the value at the head, blocking while the queue is open and
    /// empty.
    ///
    /// Buffered values are drained even after the queue closes; only a
    /// closed *and* empty queue reports the end.
    ///
    /// # Errors
    ///
    /// Returns [`PopError::Exhausted`] once the queue is closed and every
    /// buffered value has been taken.
    pub fn pop(&self) -> Result<T, PopError> {
        let mut state = self.shared.lock_state();
        loop {
            if let Some(value) = state.items.pop_front() {
                return Ok(value);
            }
            if state.closed {
                return Err(PopError::Exhausted);
            }
            state = self
                .shared
                .available
                .wait(state)
                .expect("handoff queue mutex poisoned");
        }
    }

    /// Removes the value at the head without blocking.
    ///
    /// Returns `None` when the buffer is currently empty, open or not.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.shared.lock_state().items.pop_front()
    }

    /// Marks the queue complete and wakes every waiter.
    ///
    /// Idempotent; a second call has no effect. Values already buffered
    /// remain available to [`pop`](Self::pop).
    pub fn close(&self) {
        let mut state = self.shared.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;
        debug!(remaining = state.items.len(), "queue closed");
        drop(state);
        self.shared.available.notify_all();
    }

    /// Returns the number of buffered values at this instant.
    ///
    /// A snapshot; another thread may change it before the caller acts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock_state().items.len()
    }

    /// Returns whether the buffer is empty at this instant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock_state().items.is_empty()
    }

    /// Returns whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock_state().closed
    }
}

impl<T: Send + 'static> HandoffQueue<T> {
    /// Like [`pop`](Self::pop), but the wait also observes a cancellation
    /// token.
    ///
    /// Cancellation takes priority over buffered values: a cancelled token
    /// fails the call even when a value is available, and the value stays in
    /// the queue for a later taker. The token wakes blocked calls directly,
    /// so cancellation is observed promptly rather than on the next value.
    ///
    /// # Errors
    ///
    /// - [`PopError::Cancelled`] if `token` is cancelled before or during
    ///   the wait.
    /// - [`PopError::Exhausted`] once the queue is closed and drained.
    pub fn pop_cancellable(&self, token: &CancelToken) -> Result<T, PopError> {
        let mut state = self.shared.lock_state();
        let mut watch = None;
        loop {
            if token.is_cancelled() {
                // A wakeup taken for a value must be handed on when we
                // leave without the value.
                if !state.items.is_empty() {
                    self.shared.available.notify_one();
                }
                return Err(PopError::Cancelled);
            }
            if let Some(value) = state.items.pop_front() {
                return Ok(value);
            }
            if state.closed {
                return Err(PopError::Exhausted);
            }
            if watch.is_none() {
                // Register before the first suspension, then re-run the
                // checks: a cancel that missed the registry is visible by
                // the time registration returns.
                let target: Weak<Shared<T>> = Arc::downgrade(&self.shared);
                watch = Some(token.watch(target));
                continue;
            }
            state = self
                .shared
                .available
                .wait(state)
                .expect("handoff queue mutex poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let queue = HandoffQueue::new();
        queue.push(1u64);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.pop(), Ok(2));
        assert_eq!(queue.pop(), Ok(3));
    }

    #[test]
    fn test_close_then_drain_then_exhausted() {
        let queue = HandoffQueue::new();
        queue.push(10u64);
        queue.push(20);
        queue.close();

        assert_eq!(queue.pop(), Ok(10));
        assert_eq!(queue.pop(), Ok(20));
        assert_eq!(queue.pop(), Err(PopError::Exhausted));
        assert_eq!(queue.pop(), Err(PopError::Exhausted));
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = HandoffQueue::<u64>::new();
        queue.close();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.pop(), Err(PopError::Exhausted));
    }

    #[test]
    fn test_close_unblocks_empty_wait() {
        let queue = HandoffQueue::<u64>::new();
        let waiter = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(waiter.join().unwrap(), Err(PopError::Exhausted));
    }

    #[test]
    fn test_close_wakes_every_waiter() {
        let queue = HandoffQueue::<u64>::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || queue.pop())
            })
            .collect();

        std::thread::sleep(Duration::from_millis(50));
        queue.close();

        for handle in waiters {
            assert_eq!(handle.join().unwrap(), Err(PopError::Exhausted));
        }
    }

    #[test]
    fn test_blocking_pop_sees_later_push() {
        let queue = HandoffQueue::new();
        let waiter = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.push(42u64);

        assert_eq!(waiter.join().unwrap(), Ok(42));
    }

    #[test]
    fn test_push_after_close_still_delivered() {
        let queue = HandoffQueue::new();
        queue.close();
        queue.push(7u64);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Ok(7));
        assert_eq!(queue.pop(), Err(PopError::Exhausted));
    }

    #[test]
    fn test_try_pop_never_blocks() {
        let queue = HandoffQueue::new();
        assert_eq!(queue.try_pop(), None);

        queue.push(5u64);
        assert_eq!(queue.try_pop(), Some(5));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_len_and_is_empty() {
        let queue = HandoffQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        queue.push(1u64);
        queue.push(2);
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 2);

        let _ = queue.pop();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clones_share_one_buffer() {
        let queue = HandoffQueue::new();
        let other = queue.clone();

        queue.push(1u64);
        other.push(2);

        assert_eq!(other.pop(), Ok(1));
        assert_eq!(queue.pop(), Ok(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_fifo_order() {
        let queue = HandoffQueue::new();
        let count = 1000u64;

        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..count {
                    queue.push(i);
                }
                queue.close();
            })
        };

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let mut received = Vec::with_capacity(count as usize);
                while let Ok(value) = queue.pop() {
                    received.push(value);
                }
                received
            })
        };

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        assert_eq!(received.len(), count as usize);
        for (i, &value) in received.iter().enumerate() {
            assert_eq!(value, i as u64);
        }
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let queue = HandoffQueue::<u64>::new();
        let token = CancelToken::new();
        token.cancel();

        assert_eq!(queue.pop_cancellable(&token), Err(PopError::Cancelled));
    }

    #[test]
    fn test_cancellation_outranks_available_data() {
        let queue = HandoffQueue::new();
        let token = CancelToken::new();

        queue.push(9u64);
        token.cancel();

        assert_eq!(queue.pop_cancellable(&token), Err(PopError::Cancelled));
        // The value stays for a non-cancelled taker.
        assert_eq!(queue.try_pop(), Some(9));
    }

    #[test]
    fn test_cancel_unblocks_waiting_pop() {
        let queue = HandoffQueue::<u64>::new();
        let token = CancelToken::new();

        let waiter = {
            let queue = queue.clone();
            let token = token.clone();
            std::thread::spawn(move || queue.pop_cancellable(&token))
        };

        std::thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert_eq!(waiter.join().unwrap(), Err(PopError::Cancelled));
    }

    #[test]
    fn test_pop_cancellable_drains_and_exhausts() {
        let queue = HandoffQueue::new();
        let token = CancelToken::new();

        queue.push(1u64);
        queue.close();

        assert_eq!(queue.pop_cancellable(&token), Ok(1));
        assert_eq!(queue.pop_cancellable(&token), Err(PopError::Exhausted));
    }

    #[test]
    fn test_cancelled_waiter_passes_the_wakeup_on() {
        // Two waiters, one cancellable. After cancel and a push, the plain
        // waiter must still receive the value even if the push notification
        // first lands on the cancelled one.
        let queue = HandoffQueue::<u64>::new();
        let token = CancelToken::new();

        let cancellable = {
            let queue = queue.clone();
            let token = token.clone();
            std::thread::spawn(move || queue.pop_cancellable(&token))
        };
        let plain = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };

        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
        queue.push(5);

        assert_eq!(cancellable.join().unwrap(), Err(PopError::Cancelled));
        assert_eq!(plain.join().unwrap(), Ok(5));
        assert!(queue.is_empty());
    }
}
