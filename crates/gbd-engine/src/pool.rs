use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gbd_accountant::{Accountant, TrackingAllocator};
use gbd_core::{Extract, JobKey, JobOutcome};

use crate::api::{PoolConfig, PoolUsage, WorkerUsage};
use crate::job::Task;
use crate::queue::Queue;
use crate::worker;

/// A bounded-resource parallel job pool.
///
/// Submitted jobs are executed by a fixed number of worker threads, each
/// allocation accounted for by the tracking allocator installed on
/// `allocator`. A job whose allocations would push the pool over its
/// memory cap is requeued with a larger estimate rather than failed
/// outright, up to the point where the estimate itself can never fit —
/// at which point it is abandoned.
pub struct Pool {
    jobs: Arc<Queue<Task>>,
    results: Arc<Queue<JobOutcome>>,
    accountant: Arc<Accountant>,
    shutdown: Arc<AtomicBool>,
    submitted: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
    initial_memnbt: usize,
}

impl Pool {
    /// Start a pool per `config`, installing `config`'s memory cap and
    /// time budget on the process-wide tracking allocator `allocator`.
    ///
    /// `allocator` must be the same `TrackingAllocator` the process has
    /// registered with `#[global_allocator]`, or job allocations will not
    /// be charged against this pool's budget at all.
    pub fn new(config: PoolConfig, allocator: &'static TrackingAllocator) -> Self {
        let accountant = Accountant::with_job_buffer(config.mem_cap_bytes, config.job_buffer_bytes);
        accountant.set_time_cap(config.time_cap);
        allocator.install(accountant.clone());

        let jobs = Arc::new(Queue::new());
        let results = Arc::new(Queue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let submitted = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let handles = (0..config.workers.max(1))
            .map(|id| {
                worker::spawn(
                    id,
                    jobs.clone(),
                    results.clone(),
                    accountant.clone(),
                    shutdown.clone(),
                    completed.clone(),
                    active.clone(),
                    PoolConfig::DEFAULT_IDLE_SLEEP,
                )
            })
            .collect();

        log::info!(
            "pool started: {} worker(s), {} byte cap",
            config.workers.max(1),
            config.mem_cap_bytes
        );

        Self {
            jobs,
            results,
            accountant,
            shutdown,
            submitted,
            completed,
            active,
            handles,
            initial_memnbt: config.initial_memnbt,
        }
    }

    /// Submit a job. `factory` is called fresh on every attempt (including
    /// after a requeue), so it should close only over the input descriptor,
    /// never over state mutated by a previous attempt.
    pub fn submit<F>(&self, key: JobKey, factory: F)
    where
        F: Fn() -> Box<dyn Extract> + Send + 'static,
    {
        self.submitted.fetch_add(1, Ordering::AcqRel);
        self.jobs
            .push(Task::new(key, Box::new(factory), self.initial_memnbt));
    }

    /// Pop one finished job's outcome, if any are ready, without blocking.
    pub fn poll(&self) -> Option<JobOutcome> {
        self.results.try_pop()
    }

    /// True once every submitted job has produced an outcome and none are
    /// queued or in flight.
    pub fn ready(&self) -> bool {
        self.jobs.is_empty()
            && self.completed.load(Ordering::Acquire) >= self.submitted.load(Ordering::Acquire)
    }

    /// Snapshot pool-wide and per-worker memory usage, for telemetry.
    pub fn usage(&self) -> PoolUsage {
        let workers = self
            .accountant
            .registry()
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(worker_id, data)| WorkerUsage {
                worker_id,
                allocated: data.allocated(),
                peak: data.peak(),
                num_allocs: data.num_allocs(),
            })
            .collect();

        PoolUsage {
            reserved: self.accountant.reserved(),
            mem_cap_bytes: self.accountant.mem_max(),
            active_jobs: self.active.load(Ordering::Acquire),
            workers,
        }
    }

    /// Signal workers to stop once the job queue drains, and wait for them
    /// to exit. Jobs already queued still run to completion; nothing new
    /// should be submitted after calling this.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            if let Err(panic_payload) = handle.join() {
                let msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                log::error!("worker thread terminated on an unhandled panic: {msg}");
            }
        }
        log::info!("pool stopped");
    }
}
