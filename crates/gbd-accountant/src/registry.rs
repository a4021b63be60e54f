use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Per-worker accounting record.
///
/// A thread owns exactly one `ThreadData` for the lifetime of the process
/// (handed out once by `Registry::current` and cached thread-locally).
/// Fields are atomics so a supervisor thread can sample live totals without
/// taking a lock, even while the owning worker keeps allocating.
pub struct ThreadData {
    allocated: AtomicUsize,
    peak: AtomicUsize,
    num_allocs: AtomicU64,
    job_reserved: AtomicUsize,
    extra_reserved: AtomicUsize,
    job_start_nanos: AtomicU64,
}

impl ThreadData {
    fn new() -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            num_allocs: AtomicU64::new(0),
            job_reserved: AtomicUsize::new(0),
            extra_reserved: AtomicUsize::new(0),
            job_start_nanos: AtomicU64::new(0),
        }
    }

    /// Record the pool-reserved allowance a new job was started with, and
    /// the clock reading (`Accountant::now_nanos`) at which it started —
    /// this job's own `T0`, against which its time budget is measured.
    pub fn start_job(&self, allowance: usize, start_nanos: u64) {
        self.job_reserved.store(allowance, Ordering::Release);
        self.extra_reserved.store(0, Ordering::Release);
        self.allocated.store(0, Ordering::Release);
        self.peak.store(0, Ordering::Release);
        self.num_allocs.store(0, Ordering::Release);
        self.job_start_nanos.store(start_nanos, Ordering::Release);
    }

    /// The clock reading at which the current job started (`T0`).
    pub fn job_start_nanos(&self) -> u64 {
        self.job_start_nanos.load(Ordering::Acquire)
    }

    /// Bytes this thread would need to request from the pool to cover an
    /// allocation of `size` bytes, given how much slack remains in the
    /// job's already-reserved allowance. Zero when the allowance covers it.
    pub fn rmem_needed(&self, size: usize) -> usize {
        let reserved = self.job_reserved.load(Ordering::Acquire) + self.extra_reserved.load(Ordering::Acquire);
        let allocated = self.allocated.load(Ordering::Acquire);
        let slack = reserved.saturating_sub(allocated);
        size.saturating_sub(slack)
    }

    /// Commit `size` bytes as allocated; `extra` (if non-zero) was just
    /// reserved from the pool to cover the shortfall and is tracked so it
    /// gets released at `finish_job`.
    pub fn inc_allocated(&self, size: usize, extra: usize) {
        if extra > 0 {
            self.extra_reserved.fetch_add(extra, Ordering::AcqRel);
        }
        self.num_allocs.fetch_add(1, Ordering::Relaxed);
        let new_total = self.allocated.fetch_add(size, Ordering::AcqRel) + size;
        self.peak.fetch_max(new_total, Ordering::AcqRel);
    }

    /// Record `size` bytes freed.
    pub fn dec_allocated(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::AcqRel);
    }

    /// Peak bytes live at any point during the current job.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Bytes live right now.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Number of allocations made during the current job.
    pub fn num_allocs(&self) -> u64 {
        self.num_allocs.load(Ordering::Acquire)
    }

    /// Release this job's reservation (initial allowance plus any
    /// shortfall reserved mid-job) and reset counters for the next job.
    /// Returns the total byte count to hand back to the pool.
    pub fn finish_job(&self) -> usize {
        let total = self.job_reserved.swap(0, Ordering::AcqRel) + self.extra_reserved.swap(0, Ordering::AcqRel);
        total
    }
}

/// Process-wide table of `ThreadData`, one entry per worker thread that has
/// ever called `current()`. Threads that never call `current()` (the
/// engine's own bookkeeping/supervisor threads) have no entry and are never
/// charged against the pool's memory cap — the UNTRACKED case.
pub struct Registry {
    next_id: AtomicUsize,
    table: Mutex<Vec<Arc<ThreadData>>>,
}

thread_local! {
    static LOCAL_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

impl Registry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            table: Mutex::new(Vec::new()),
        }
    }

    /// Return this thread's `ThreadData`, assigning it a dense id and
    /// creating the record on first use.
    pub fn current(&self) -> Arc<ThreadData> {
        let id = LOCAL_ID.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::AcqRel);
                cell.set(Some(id));
                id
            }
        });

        let mut table = self.table.lock().expect("registry table poisoned");
        while table.len() <= id {
            table.push(Arc::new(ThreadData::new()));
        }
        Arc::clone(&table[id])
    }

    /// Snapshot every worker's accounting record, for telemetry sampling.
    pub fn snapshot(&self) -> Vec<Arc<ThreadData>> {
        self.table.lock().expect("registry table poisoned").clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmem_needed_accounts_for_allowance() {
        let data = ThreadData::new();
        data.start_job(100, 0);
        assert_eq!(data.rmem_needed(50), 0);
        data.inc_allocated(80, 0);
        assert_eq!(data.rmem_needed(30), 10);
    }

    #[test]
    fn finish_job_returns_full_reservation() {
        let data = ThreadData::new();
        data.start_job(100, 0);
        data.inc_allocated(80, 20);
        assert_eq!(data.finish_job(), 120);
        assert_eq!(data.allocated(), 80);
    }

    #[test]
    fn registry_hands_out_stable_per_thread_records() {
        let registry = Registry::new();
        let a = registry.current();
        let b = registry.current();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
