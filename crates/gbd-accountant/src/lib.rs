#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Memory- and time-accounting primitives for the batch feature-extraction
//! engine: a per-worker thread-data registry, a pool-wide memory/time
//! accountant, and a `GlobalAlloc` that charges tracked threads' allocations
//! against the accountant and reports budget exhaustion as a `Termination`
//! value rather than an unwind-safe exception.
//!
//! This crate cannot carry the workspace's usual `forbid(unsafe_code)`
//! lint: implementing `GlobalAlloc` requires it. The unsafe surface is
//! confined to `alloc`, where it does nothing but forward to `System`.

pub mod accountant;
pub mod alloc;
pub mod registry;

pub use accountant::{Accountant, TerminationGuard, DEFAULT_JOB_BUFFER_BYTES};
pub use alloc::{mark_tracked, mark_untracked, termination_from_panic, Termination, TrackingAllocator};
pub use registry::{Registry, ThreadData};
