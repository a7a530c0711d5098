//! Synchronization primitives for in-process communication.
//!
//! This module provides the blocking handoff queue threads use to pass
//! values to each other, and the cancellation token that stops a blocked
//! wait from the outside.

pub mod cancel;
pub mod handoff;
