//! The handoff flow over the standard library's channel.
//!
//! [`std::sync::mpsc`] already provides the blocking receive and the
//! end-of-stream signal, so this variant needs no queue of its own: sender
//! drop marks completion, and a failed `recv` plays the exhausted role.
//! Receivers cannot be shared, so the run is fixed at one producer and one
//! consumer.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use minstant::Instant;

use crate::runtime::session::{SessionError, SessionReport};
use crate::runtime::workers::{ConsumerExit, ConsumerSummary, ProducerSummary};
use crate::trace::info;

/// Runs one producer and one consumer over a std channel.
///
/// The producer sends `1..=items` paced by `produce_delay`; the consumer
/// drains until the channel disconnects, pacing by `consume_delay`. The
/// report has the same shape a one-pair [`Session`](crate::runtime::session::Session)
/// run produces.
///
/// # Errors
///
/// Returns [`SessionError::WorkerPanic`] when either thread panicked.
///
/// # Panics
///
/// Panics if thread spawning fails.
pub fn run(
    items: u32,
    produce_delay: Duration,
    consume_delay: Duration,
) -> Result<SessionReport, SessionError> {
    let started = Instant::now();
    let (sender, receiver) = mpsc::channel::<u64>();

    let producer = thread::Builder::new()
        .name("baton-producer-1".into())
        .spawn(move || {
            let mut pushed = 0u32;
            for seq in 1..=u64::from(items) {
                if sender.send(seq).is_err() {
                    // Receiver gone; nobody left to hand values to.
                    break;
                }
                pushed += 1;
                info!(producer = 1u32, value = seq, "produced");
                if !produce_delay.is_zero() && seq < u64::from(items) {
                    thread::sleep(produce_delay);
                }
            }
            // The sender drops here, which closes the channel.
            ProducerSummary { pushed }
        })
        .expect("failed to spawn producer thread");

    let consumer = thread::Builder::new()
        .name("baton-consumer-1".into())
        .spawn(move || {
            let mut values = Vec::new();
            while let Ok(value) = receiver.recv() {
                info!(consumer = 1u32, value, "consumed");
                values.push(value);
                if !consume_delay.is_zero() {
                    thread::sleep(consume_delay);
                }
            }
            ConsumerSummary {
                id: 1,
                values,
                exit: ConsumerExit::Exhausted,
            }
        })
        .expect("failed to spawn consumer thread");

    let producer_result = producer.join();
    let consumer_result = consumer.join();

    let produced = match producer_result {
        Ok(summary) => u64::from(summary.pushed),
        Err(_) => {
            return Err(SessionError::WorkerPanic {
                role: "producer",
                index: 1,
            });
        }
    };
    let summary = match consumer_result {
        Ok(summary) => summary,
        Err(_) => {
            return Err(SessionError::WorkerPanic {
                role: "consumer",
                index: 1,
            });
        }
    };

    let elapsed = started.elapsed();
    let consumed = summary.values.len() as u64;
    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        produced, consumed, "channel run complete"
    );

    Ok(SessionReport {
        elapsed,
        produced,
        consumed,
        per_consumer: vec![summary],
        final_len: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order_and_reports() {
        let report = run(5, Duration::ZERO, Duration::ZERO).unwrap();

        assert_eq!(report.produced, 5);
        assert_eq!(report.consumed, 5);
        assert_eq!(report.final_len, 0);
        assert_eq!(report.per_consumer[0].values, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.per_consumer[0].exit, ConsumerExit::Exhausted);
    }

    #[test]
    fn zero_items_disconnect_immediately() {
        let report = run(0, Duration::ZERO, Duration::ZERO).unwrap();

        assert_eq!(report.produced, 0);
        assert_eq!(report.consumed, 0);
        assert!(report.per_consumer[0].values.is_empty());
    }
}
