use std::alloc::{GlobalAlloc, Layout, System};
use std::any::Any;
use std::cell::Cell;
use std::sync::{Arc, OnceLock};

use crate::accountant::Accountant;

thread_local! {
    static TRACKED: Cell<bool> = const { Cell::new(false) };
}

/// Reason a tracked allocation could not proceed.
///
/// Realized as a sum type the worker loop recovers from a panic payload:
/// the allocator panics directly with a `Termination` value rather than
/// returning a null pointer, since a null return from `alloc` aborts the
/// process on stable Rust. The worker's `catch_unwind` downcasts the
/// payload back with `termination_from_panic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The pool had no memory headroom left; carries the byte count the
    /// job should be credited with needing, for the next requeue attempt.
    MemoryExceeded {
        /// Estimated bytes the job would need to run to completion.
        memnbt: usize,
    },
    /// The pool's wall-clock deadline has elapsed.
    TimeExceeded,
}

/// A `GlobalAlloc` that charges every allocation made by a thread marked
/// tracked (see `mark_tracked`) against a pool-wide memory cap and
/// deadline, and passes allocations from any other thread straight through
/// to the system allocator untracked.
pub struct TrackingAllocator {
    accountant: OnceLock<Arc<Accountant>>,
}

impl TrackingAllocator {
    /// An allocator with no accountant installed; every allocation passes
    /// through untracked until `install` is called.
    pub const fn new() -> Self {
        Self {
            accountant: OnceLock::new(),
        }
    }

    /// Attach the pool-wide accountant this allocator enforces. Call once,
    /// before spawning any worker thread. Later calls are ignored.
    pub fn install(&self, accountant: Arc<Accountant>) {
        let _ = self.accountant.set(accountant);
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Mark the calling thread's allocations as subject to tracking. Worker
/// threads call this once at startup; engine bookkeeping threads never
/// call it and so stay untracked.
pub fn mark_tracked() {
    TRACKED.with(|cell| cell.set(true));
}

/// Stop charging the calling thread's allocations.
pub fn mark_untracked() {
    TRACKED.with(|cell| cell.set(false));
}

/// Recover a `Termination` from a `catch_unwind` panic payload, if that
/// panic was raised by this allocator rather than by ordinary program
/// logic.
pub fn termination_from_panic(payload: &(dyn Any + Send)) -> Option<Termination> {
    payload.downcast_ref::<Termination>().copied()
}

// Safety: `alloc`/`dealloc` only ever forward to `System`, after bookkeeping
// that itself performs no allocation (all counters are fixed-size atomics).
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !TRACKED.with(|cell| cell.get()) {
            return unsafe { System.alloc(layout) };
        }
        let Some(accountant) = self.accountant.get() else {
            return unsafe { System.alloc(layout) };
        };

        let data = accountant.registry().current();

        if !accountant.has_time(data.job_start_nanos()) {
            std::panic::panic_any(Termination::TimeExceeded);
        }

        let bytes = layout.size();
        let mut shortfall = data.rmem_needed(bytes);
        while shortfall > 0 && !accountant.try_reserve(shortfall) {
            if !accountant.has_time(data.job_start_nanos()) {
                std::panic::panic_any(Termination::TimeExceeded);
            }
            // Only one thread at a time gets to declare defeat; everyone
            // else spins a little and rechecks, so a momentary squeeze
            // doesn't make every worker give up at once.
            match accountant.try_begin_termination() {
                Some(_guard) => {
                    let memnbt = data.peak().max(data.allocated() + bytes);
                    std::panic::panic_any(Termination::MemoryExceeded { memnbt });
                }
                None => {
                    std::thread::sleep(std::time::Duration::from_micros(200));
                    shortfall = data.rmem_needed(bytes);
                }
            }
        }

        let ptr = unsafe { System.alloc(layout) };
        if ptr.is_null() {
            if shortfall > 0 {
                accountant.unreserve(shortfall);
            }
            let memnbt = data.peak().max(data.allocated() + bytes);
            std::panic::panic_any(Termination::MemoryExceeded { memnbt });
        }
        data.inc_allocated(bytes, shortfall);
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if TRACKED.with(|cell| cell.get()) {
            if let Some(accountant) = self.accountant.get() {
                accountant.registry().current().dec_allocated(layout.size());
            }
        }
        unsafe { System.dealloc(ptr, layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_termination_panic_is_not_recognized() {
        let payload: Box<dyn Any + Send> = Box::new("some other panic");
        assert!(termination_from_panic(payload.as_ref()).is_none());
    }

    #[test]
    fn termination_panic_round_trips() {
        let payload: Box<dyn Any + Send> = Box::new(Termination::TimeExceeded);
        assert_eq!(
            termination_from_panic(payload.as_ref()),
            Some(Termination::TimeExceeded)
        );
    }
}
