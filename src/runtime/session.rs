//! Session harness: a full producer/consumer run over one shared queue.
//!
//! # Architecture
//!
//! A session spawns `producers` threads pushing values and `consumers`
//! threads draining them, all over a single [`HandoffQueue`]. Completion is
//! a handshake owned by the harness:
//!
//! 1. Join every producer. No producer may still be running when the queue
//!    closes, so closing is never a per-producer decision.
//! 2. Close the queue. This also runs when a producer panicked, so blocked
//!    consumers are never stranded.
//! 3. Join every consumer and assemble the report.
//!
//! With several producers, values are tagged `id * TAG_STRIDE + seq` to
//! keep the ranges disjoint; the configuration is validated against the
//! stride up front. A lone producer pushes the plain sequence `1..=count`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use baton::runtime::session::{SessionConfig, run};
//!
//! let report = run(SessionConfig {
//!     producers: 2,
//!     consumers: 2,
//!     items_per_producer: 5,
//!     produce_delay: Duration::ZERO,
//!     consume_delay: Duration::ZERO,
//! })?;
//!
//! assert_eq!(report.produced, 10);
//! assert_eq!(report.consumed, 10);
//! assert_eq!(report.final_len, 0);
//! # Ok::<(), baton::runtime::session::SessionError>(())
//! ```

use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;

use crate::runtime::workers::{self, ConsumerSummary, ProducePlan, ProducerSummary, TAG_STRIDE};
use crate::sync::cancel::CancelToken;
use crate::sync::handoff::HandoffQueue;
use crate::trace::{debug, error, info};

/// Configuration for a session run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of producer threads.
    pub producers: u32,
    /// Number of consumer threads.
    pub consumers: u32,
    /// Values each producer pushes.
    pub items_per_producer: u32,
    /// Pause between pushes on each producer.
    pub produce_delay: Duration,
    /// Pause after each value on each consumer.
    pub consume_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            producers: 1,
            consumers: 1,
            items_per_producer: 10,
            produce_delay: Duration::from_millis(500),
            consume_delay: Duration::from_millis(300),
        }
    }
}

/// Error running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Tagged values from different producers would collide.
    #[error("{items} items per producer exceeds the tag stride for multi-producer runs")]
    TagCollision {
        /// The configured `items_per_producer`.
        items: u32,
    },
    /// A worker thread panicked.
    #[error("{role} thread {index} panicked")]
    WorkerPanic {
        /// `"producer"` or `"consumer"`.
        role: &'static str,
        /// 1-based worker index.
        index: u32,
    },
}

/// Final accounting for a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Wall-clock duration from spawn to the last join.
    pub elapsed: Duration,
    /// Total values pushed across all producers.
    pub produced: u64,
    /// Total values taken across all consumers.
    pub consumed: u64,
    /// Per-consumer summaries, in consumer id order.
    pub per_consumer: Vec<ConsumerSummary>,
    /// Queue length observed after all workers exited.
    pub final_len: usize,
}

/// Handle to a running session.
///
/// Dropping the handle cancels the session but does not wait for worker
/// threads; use [`Session::join`] for a clean shutdown with a report.
pub struct Session {
    queue: HandoffQueue<u64>,
    token: CancelToken,
    started: Instant,
    producers: Vec<Option<JoinHandle<ProducerSummary>>>,
    consumers: Vec<Option<JoinHandle<ConsumerSummary>>>,
}

impl Session {
    /// Spawns the session's worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TagCollision`] when a multi-producer
    /// configuration asks for more items per producer than the tag stride
    /// can keep disjoint.
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn spawn(config: SessionConfig) -> Result<Self, SessionError> {
        if config.producers > 1 && u64::from(config.items_per_producer) >= TAG_STRIDE {
            return Err(SessionError::TagCollision {
                items: config.items_per_producer,
            });
        }

        info!(
            producers = config.producers,
            consumers = config.consumers,
            items_per_producer = config.items_per_producer,
            produce_delay_ms = config.produce_delay.as_millis() as u64,
            consume_delay_ms = config.consume_delay.as_millis() as u64,
            "session starting"
        );

        let queue = HandoffQueue::new();
        let token = CancelToken::new();
        let started = Instant::now();
        let tagged = config.producers > 1;

        let mut producers = Vec::with_capacity(config.producers as usize);
        for id in 1..=config.producers {
            let queue = queue.clone();
            let token = token.clone();
            let plan = ProducePlan {
                id,
                count: config.items_per_producer,
                delay: config.produce_delay,
                tagged,
            };
            debug!(producer = id, "spawning producer thread");
            let handle = thread::Builder::new()
                .name(format!("baton-producer-{id}"))
                .spawn(move || workers::produce(&queue, &token, plan))
                .expect("failed to spawn producer thread");
            producers.push(Some(handle));
        }

        let mut consumers = Vec::with_capacity(config.consumers as usize);
        for id in 1..=config.consumers {
            let queue = queue.clone();
            let token = token.clone();
            let delay = config.consume_delay;
            debug!(consumer = id, "spawning consumer thread");
            let handle = thread::Builder::new()
                .name(format!("baton-consumer-{id}"))
                .spawn(move || workers::consume(&queue, &token, id, delay))
                .expect("failed to spawn consumer thread");
            consumers.push(Some(handle));
        }

        Ok(Self {
            queue,
            token,
            started,
            producers,
            consumers,
        })
    }

    /// Returns a handle to the session's queue.
    #[must_use]
    pub fn queue(&self) -> HandoffQueue<u64> {
        self.queue.clone()
    }

    /// Returns a clone of the cancellation token for external stop requests.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Waits for the whole session to finish and reports on it.
    ///
    /// Joins producers, closes the queue exactly once, then joins consumers.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerPanic`] when any worker thread
    /// panicked; the remaining workers are still joined first.
    pub fn join(mut self) -> Result<SessionReport, SessionError> {
        let mut produced = 0u64;
        let mut producer_panic = None;
        for (index, slot) in self.producers.iter_mut().enumerate() {
            if let Some(handle) = slot.take() {
                match handle.join() {
                    Ok(summary) => produced += u64::from(summary.pushed),
                    Err(_) => {
                        error!(producer = index as u32 + 1, "producer thread panicked");
                        producer_panic = Some(SessionError::WorkerPanic {
                            role: "producer",
                            index: index as u32 + 1,
                        });
                    }
                }
            }
        }

        // Consumers must not be left blocked, producer panic or not.
        self.queue.close();

        let mut per_consumer = Vec::with_capacity(self.consumers.len());
        let mut consumer_panic = None;
        for (index, slot) in self.consumers.iter_mut().enumerate() {
            if let Some(handle) = slot.take() {
                match handle.join() {
                    Ok(summary) => per_consumer.push(summary),
                    Err(_) => {
                        error!(consumer = index as u32 + 1, "consumer thread panicked");
                        consumer_panic = Some(SessionError::WorkerPanic {
                            role: "consumer",
                            index: index as u32 + 1,
                        });
                    }
                }
            }
        }

        if let Some(panic) = producer_panic.or(consumer_panic) {
            return Err(panic);
        }

        let elapsed = self.started.elapsed();
        let consumed: u64 = per_consumer.iter().map(|s| s.values.len() as u64).sum();
        let final_len = self.queue.len();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            produced,
            consumed,
            final_len,
            "session complete"
        );

        Ok(SessionReport {
            elapsed,
            produced,
            consumed,
            per_consumer,
            final_len,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Signal workers if join() was skipped; does not wait for them.
        self.token.cancel();
    }
}

/// Spawns a session and waits for it to finish.
///
/// # Errors
///
/// See [`Session::spawn`] and [`Session::join`].
pub fn run(config: SessionConfig) -> Result<SessionReport, SessionError> {
    Session::spawn(config)?.join()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::runtime::workers::ConsumerExit;

    fn quick(producers: u32, consumers: u32, items: u32) -> SessionConfig {
        SessionConfig {
            producers,
            consumers,
            items_per_producer: items,
            produce_delay: Duration::ZERO,
            consume_delay: Duration::ZERO,
        }
    }

    #[test]
    fn default_config_matches_demo_shape() {
        let config = SessionConfig::default();
        assert_eq!(config.producers, 1);
        assert_eq!(config.consumers, 1);
        assert_eq!(config.items_per_producer, 10);
        assert_eq!(config.produce_delay, Duration::from_millis(500));
        assert_eq!(config.consume_delay, Duration::from_millis(300));
    }

    #[test]
    fn rejects_tag_collisions() {
        let result = Session::spawn(quick(2, 1, 100));
        assert!(matches!(
            result,
            Err(SessionError::TagCollision { items: 100 })
        ));
    }

    #[test]
    fn lone_producer_may_exceed_the_stride() {
        let report = run(quick(1, 1, 150)).unwrap();
        assert_eq!(report.produced, 150);
        assert_eq!(report.consumed, 150);
    }

    #[test]
    fn accounting_adds_up() {
        let report = run(quick(1, 1, 5)).unwrap();

        assert_eq!(report.produced, 5);
        assert_eq!(report.consumed, 5);
        assert_eq!(report.final_len, 0);
        assert_eq!(report.per_consumer.len(), 1);
        assert_eq!(report.per_consumer[0].values, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.per_consumer[0].exit, ConsumerExit::Exhausted);
    }

    #[test]
    fn zero_items_still_terminates() {
        let report = run(quick(1, 2, 0)).unwrap();

        assert_eq!(report.produced, 0);
        assert_eq!(report.consumed, 0);
        assert_eq!(report.final_len, 0);
        for summary in &report.per_consumer {
            assert_eq!(summary.exit, ConsumerExit::Exhausted);
        }
    }

    #[test]
    fn multi_producer_values_stay_disjoint() {
        let report = run(quick(2, 1, 3)).unwrap();

        let mut values = report.per_consumer[0].values.clone();
        values.sort_unstable();
        assert_eq!(values, vec![101, 102, 103, 201, 202, 203]);
    }

    #[test]
    fn cancel_token_stops_a_session() {
        let session = Session::spawn(SessionConfig {
            producers: 1,
            consumers: 2,
            items_per_producer: 1_000_000,
            produce_delay: Duration::from_millis(1),
            consume_delay: Duration::ZERO,
        })
        .unwrap();

        session.cancel_token().cancel();
        let report = session.join().unwrap();

        assert!(report.produced < 1_000_000);
        for summary in &report.per_consumer {
            assert_eq!(summary.exit, ConsumerExit::Cancelled);
        }
    }

    #[test]
    fn queue_accessor_shares_the_session_queue() {
        let session = Session::spawn(quick(1, 1, 0)).unwrap();
        let queue = session.queue();
        let report = session.join().unwrap();

        assert!(queue.is_closed());
        assert_eq!(report.final_len, 0);
    }
}
