//! Runtime scaffolding for producer/consumer runs.
//!
//! - `workers`: the producer and consumer driver loops.
//! - `session`: spawns and joins a full N-producer/M-consumer run.
//! - `channel`: the same flow over the standard library's channel.

pub mod channel;
pub mod session;
pub mod workers;
