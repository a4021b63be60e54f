//! Public configuration and snapshot types for the job pool.

use std::time::Duration;

/// Configuration for a `Pool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool-wide memory cap, in bytes.
    pub mem_cap_bytes: usize,
    /// Number of worker threads to run.
    pub workers: usize,
    /// Per-job wall-clock budget `τ`; `None` means no deadline. Each job's
    /// clock starts fresh when that job begins running, not when the pool
    /// was constructed.
    pub time_cap: Option<Duration>,
    /// Per-job safety buffer subtracted from `mem_cap_bytes` when deciding
    /// whether a job's memory estimate could ever be accommodated.
    /// Defaults to `gbd_accountant::DEFAULT_JOB_BUFFER_BYTES`; override for
    /// tests that exercise caps too small for the default to make sense.
    pub job_buffer_bytes: usize,
    /// Initial "memory needed before termination" estimate given to jobs
    /// that have never been requeued. Defaults to `job_buffer_bytes`.
    pub initial_memnbt: usize,
}

impl PoolConfig {
    /// How long an idle worker sleeps between empty polls of the job queue.
    pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(5);

    /// A pool with one worker per available CPU and no time cap.
    pub fn new(mem_cap_bytes: usize) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            mem_cap_bytes,
            workers,
            time_cap: None,
            job_buffer_bytes: gbd_accountant::DEFAULT_JOB_BUFFER_BYTES,
            initial_memnbt: gbd_accountant::DEFAULT_JOB_BUFFER_BYTES,
        }
    }

    /// Override the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set a wall-clock budget for the whole batch.
    pub fn with_time_cap(mut self, time_cap: Duration) -> Self {
        self.time_cap = Some(time_cap);
        self
    }

    /// Override the per-job safety buffer and the matching initial memnbt
    /// estimate. Intended for tests driving small synthetic memory caps.
    pub fn with_job_buffer(mut self, job_buffer_bytes: usize) -> Self {
        self.job_buffer_bytes = job_buffer_bytes;
        self.initial_memnbt = job_buffer_bytes;
        self
    }
}

/// A snapshot of one worker's live accounting, for telemetry.
#[derive(Debug, Clone, Copy)]
pub struct WorkerUsage {
    /// Dense worker id (0-based, order of first use).
    pub worker_id: usize,
    /// Bytes the worker's current job has allocated right now.
    pub allocated: usize,
    /// Peak bytes allocated during the current job.
    pub peak: usize,
    /// Number of allocations performed during the current job.
    pub num_allocs: u64,
}

/// A pool-wide snapshot: total reserved bytes plus one entry per worker
/// that has run at least one job so far.
#[derive(Debug, Clone)]
pub struct PoolUsage {
    /// Bytes currently reserved pool-wide.
    pub reserved: usize,
    /// Pool-wide memory cap.
    pub mem_cap_bytes: usize,
    /// Number of workers currently running a job (the original engine's
    /// "jobs" telemetry column).
    pub active_jobs: usize,
    /// Per-worker usage.
    pub workers: Vec<WorkerUsage>,
}
