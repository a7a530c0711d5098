//! Producer and consumer driver loops.
//!
//! Thin loops over [`HandoffQueue`]: pacing and per-worker accounting live
//! here, while all synchronization stays in the queue itself. Producers
//! check their token between pushes; consumers observe it through the
//! blocking wait.

use std::thread;
use std::time::Duration;

use crate::sync::cancel::CancelToken;
use crate::sync::handoff::{HandoffQueue, PopError};
use crate::trace::{debug, info};

/// Spacing between producer tag ranges; producer `id` owns values
/// `id * TAG_STRIDE + 1 ..= id * TAG_STRIDE + count`.
pub const TAG_STRIDE: u64 = 100;

/// What a single producer pushes.
#[derive(Debug, Clone, Copy)]
pub struct ProducePlan {
    /// 1-based producer id, used for narration and tagging.
    pub id: u32,
    /// Number of values to push.
    pub count: u32,
    /// Pause between consecutive pushes.
    pub delay: Duration,
    /// When set, values are `id * TAG_STRIDE + seq` so ranges from
    /// different producers stay disjoint; otherwise plain `seq`.
    pub tagged: bool,
}

/// Accounting returned by [`produce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSummary {
    /// Values actually pushed; short of the plan when cancelled early.
    pub pushed: u32,
}

/// Why a consumer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The queue closed and drained; the normal end.
    Exhausted,
    /// The cancellation token stopped the wait.
    Cancelled,
}

/// Accounting returned by [`consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSummary {
    /// 1-based consumer id.
    pub id: u32,
    /// Values taken, in consumption order.
    pub values: Vec<u64>,
    /// Why the loop stopped.
    pub exit: ConsumerExit,
}

/// Runs one producer to completion.
///
/// Pushes `plan.count` values, sleeping `plan.delay` between pushes. The
/// token is checked at each loop head; pushes never block, so a cancelled
/// token stops the loop at the next iteration rather than mid-push.
pub fn produce(
    queue: &HandoffQueue<u64>,
    token: &CancelToken,
    plan: ProducePlan,
) -> ProducerSummary {
    let mut pushed = 0u32;
    for seq in 1..=plan.count {
        if token.is_cancelled() {
            debug!(producer = plan.id, pushed, "producer stopping early");
            break;
        }
        let value = if plan.tagged {
            u64::from(plan.id) * TAG_STRIDE + u64::from(seq)
        } else {
            u64::from(seq)
        };
        queue.push(value);
        pushed += 1;
        info!(producer = plan.id, value, len = queue.len(), "produced");
        if !plan.delay.is_zero() && seq < plan.count {
            thread::sleep(plan.delay);
        }
    }
    ProducerSummary { pushed }
}

/// Runs one consumer until the queue is exhausted or the token cancels.
///
/// Sleeps `delay` after each value to model processing cost. Tolerates the
/// producing side finishing at any point, including before the first value.
pub fn consume(
    queue: &HandoffQueue<u64>,
    token: &CancelToken,
    id: u32,
    delay: Duration,
) -> ConsumerSummary {
    let mut values = Vec::new();
    let exit = loop {
        match queue.pop_cancellable(token) {
            Ok(value) => {
                info!(consumer = id, value, len = queue.len(), "consumed");
                values.push(value);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Err(PopError::Exhausted) => break ConsumerExit::Exhausted,
            Err(PopError::Cancelled) => break ConsumerExit::Cancelled,
        }
    };
    debug!(consumer = id, taken = values.len(), exit = ?exit, "consumer finished");
    ConsumerSummary { id, values, exit }
}
