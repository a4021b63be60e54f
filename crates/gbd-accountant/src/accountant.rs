use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::registry::Registry;

/// Safety margin subtracted from the pool cap when deciding whether a job's
/// memory estimate could ever be accommodated at all. Mirrors the
/// buffer every batch extraction pool reserves per in-flight job so a
/// handful of small, unrelated allocations elsewhere never starve the
/// accounting out from under a job that is otherwise within budget.
pub const DEFAULT_JOB_BUFFER_BYTES: usize = 20_000_000;

/// Sentinel stored in `time_cap_nanos` meaning "no per-job deadline".
const NO_TIME_CAP: u64 = u64::MAX;

/// Pool-wide memory and time accounting shared by every worker.
///
/// The time budget is per-job, not pool-wide: each job gets its own clock
/// starting when the worker begins running it (`now_nanos` at job start,
/// recorded on that job's `ThreadData`), and `has_time` is always asked
/// relative to that job's own start, never the pool's construction time.
pub struct Accountant {
    registry: Registry,
    mem_max: usize,
    job_buffer: usize,
    reserved: AtomicUsize,
    epoch: Instant,
    time_cap_nanos: AtomicU64,
    termination_lock: Mutex<()>,
    termination_count: AtomicUsize,
}

impl Accountant {
    /// Build a new accountant enforcing a `mem_max`-byte cap, no time cap
    /// set yet, using the default per-job safety buffer.
    pub fn new(mem_max: usize) -> Arc<Self> {
        Self::with_job_buffer(mem_max, DEFAULT_JOB_BUFFER_BYTES)
    }

    /// Like `new`, but with an explicit per-job safety buffer instead of
    /// `DEFAULT_JOB_BUFFER_BYTES`. Mainly useful for tests exercising small
    /// synthetic memory caps, where the default buffer would dwarf the cap.
    pub fn with_job_buffer(mem_max: usize, job_buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(),
            mem_max,
            job_buffer,
            reserved: AtomicUsize::new(0),
            epoch: Instant::now(),
            time_cap_nanos: AtomicU64::new(NO_TIME_CAP),
            termination_lock: Mutex::new(()),
            termination_count: AtomicUsize::new(0),
        })
    }

    /// The configured pool memory cap, in bytes.
    pub fn mem_max(&self) -> usize {
        self.mem_max
    }

    /// The thread-data registry backing this accountant.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bytes currently reserved (promised to in-flight jobs) pool-wide.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Set (or clear) the per-job wall-clock budget `τ`. Intended to be
    /// called once, before any worker thread starts running jobs.
    pub fn set_time_cap(&self, time_cap: Option<Duration>) {
        let nanos = time_cap
            .map(|d| d.as_nanos().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(NO_TIME_CAP);
        self.time_cap_nanos.store(nanos, Ordering::Release);
    }

    /// Nanoseconds elapsed since this accountant was constructed. Used as
    /// the clock `ThreadData::start_job` stamps each job with, and that
    /// `has_time` measures elapsed time against.
    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
    }

    /// Whether less than `τ` has elapsed since `job_start_nanos` (as
    /// returned by `now_nanos` when the job started). Always true when no
    /// time cap is configured.
    pub fn has_time(&self, job_start_nanos: u64) -> bool {
        let cap = self.time_cap_nanos.load(Ordering::Acquire);
        if cap == NO_TIME_CAP {
            return true;
        }
        self.now_nanos().saturating_sub(job_start_nanos) < cap
    }

    /// True when `size` bytes could never be reserved even with the whole
    /// pool free, once the per-job safety buffer is set aside. A job whose
    /// memory estimate fails this check can never succeed no matter how
    /// many times it is requeued.
    pub fn exceeds_capacity(&self, size: usize) -> bool {
        size > self.mem_max.saturating_sub(self.job_buffer)
    }

    /// Attempt to reserve `size` bytes against the pool cap. Returns
    /// `false` (without reserving anything) if there is not enough
    /// headroom right now.
    pub fn try_reserve(&self, size: usize) -> bool {
        let mut current = self.reserved.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(size) else {
                return false;
            };
            if next > self.mem_max {
                return false;
            }
            match self.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Release `size` previously-reserved bytes back to the pool.
    pub fn unreserve(&self, size: usize) {
        if size == 0 {
            return;
        }
        self.reserved.fetch_sub(size, Ordering::AcqRel);
    }

    /// Non-blocking attempt to become the single worker responsible for
    /// deciding a requeue right now. Serializes requeue decisions so a
    /// memory spike doesn't cause every worker to requeue simultaneously
    /// (a thundering herd that would just repeat the spike).
    pub fn try_begin_termination(&self) -> Option<TerminationGuard<'_>> {
        self.termination_lock
            .try_lock()
            .ok()
            .map(|guard| TerminationGuard { _guard: guard })
    }

    /// How many requeue decisions this accountant has served so far.
    pub fn termination_count(&self) -> usize {
        self.termination_count.load(Ordering::Acquire)
    }

    /// Record one more requeue decision and return a backoff proportional
    /// to how many have happened so far, so repeated contention backs off
    /// rather than busy-looping.
    pub fn termination_penalty(&self) -> Duration {
        let count = self.termination_count.fetch_add(1, Ordering::AcqRel) + 1;
        Duration::from_millis(50 * count as u64)
    }
}

/// Held while a worker is the one deciding how to requeue a terminated job.
pub struct TerminationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_reserve_respects_cap() {
        let acc = Accountant::new(100);
        assert!(acc.try_reserve(60));
        assert!(acc.try_reserve(40));
        assert!(!acc.try_reserve(1));
        acc.unreserve(40);
        assert!(acc.try_reserve(40));
    }

    #[test]
    fn exceeds_capacity_accounts_for_job_buffer() {
        let acc = Accountant::new(DEFAULT_JOB_BUFFER_BYTES + 100);
        assert!(!acc.exceeds_capacity(100));
        assert!(acc.exceeds_capacity(101));
    }

    #[test]
    fn has_time_respects_per_job_cap() {
        let acc = Accountant::new(100);
        let start = acc.now_nanos();
        assert!(acc.has_time(start));
        acc.set_time_cap(Some(Duration::from_nanos(0)));
        assert!(!acc.has_time(start));
    }

    #[test]
    fn has_time_is_relative_to_job_start_not_accountant_creation() {
        let acc = Accountant::new(100);
        acc.set_time_cap(Some(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(5));
        // A job starting now gets its own fresh 60s budget, unaffected by
        // time already elapsed since the accountant (pool) was created.
        let start = acc.now_nanos();
        assert!(acc.has_time(start));
    }

    #[test]
    fn termination_lock_is_exclusive() {
        let acc = Accountant::new(100);
        let first = acc.try_begin_termination();
        assert!(first.is_some());
        assert!(acc.try_begin_termination().is_none());
        drop(first);
        assert!(acc.try_begin_termination().is_some());
    }
}
