#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Bounded-resource parallel job engine: a fixed pool of worker threads
//! that run extraction jobs under a pool-wide memory cap and optional
//! wall-clock budget, requeuing jobs that would exceed the cap with a
//! larger memory estimate instead of failing them outright.

mod api;
mod job;
mod pool;
mod queue;
mod worker;

pub use api::{PoolConfig, PoolUsage, WorkerUsage};
pub use pool::Pool;
pub use queue::Queue;
