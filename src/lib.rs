//! Blocking producer/consumer handoff on a shared FIFO queue.
//!
//! The core type is [`sync::handoff::HandoffQueue`], a mutex-and-condvar
//! queue with unbounded buffering, a close handshake for end-of-stream, and
//! cooperative cancellation through [`sync::cancel::CancelToken`]. On top of
//! it, [`runtime::session`] spawns whole producer/consumer runs and reports
//! their timing and accounting.

pub mod runtime;
pub mod sync;

mod trace;

pub use trace::init_tracing;
