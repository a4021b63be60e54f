use crate::features::FeatureMap;

/// Caller-chosen identifier threaded through a job so a result can be
/// matched back up to the input that produced it. Opaque to the engine.
pub type JobKey = String;

/// Error surfaced by an extractor's own logic (a malformed input file, an
/// I/O failure reading it, and so on). This is distinct from the
/// engine-level `MEMORY_EXCEEDED`/`TIME_EXCEEDED`/`TERMINATION_REQUEST`
/// kinds, which are never observed by extractor code: those are raised by
/// the tracking allocator and handled entirely inside the worker loop.
///
/// An `Err` returned here is a programmer/input error, not a resource
/// limit, and the engine does not catch it into a result status: the
/// worker lets it propagate out of the `extract` call, terminating that
/// worker thread, the same way the reference implementation only ever
/// catches its two resource-limit exceptions around extraction and lets
/// everything else propagate uncaught.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The input could not be read.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    /// The input was not well-formed for the format the extractor expects.
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// The contract between an extractor/hasher and the engine: a job is a
/// function from an input descriptor to a feature map. The engine never
/// inspects `Self`; it only calls `extract` on a worker thread and expects
/// all dynamic allocation performed by the call to flow through whichever
/// allocator the process has installed globally.
pub trait Extract: Send {
    /// Run the extraction to completion, or fail with a reason specific to
    /// this extractor.
    fn extract(&mut self) -> Result<FeatureMap, ExtractError>;
}

/// Terminal status of a job as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job ran to completion within the pool's memory and time budget.
    Success,
    /// The job was abandoned because no amount of requeuing would let it
    /// fit inside the pool's memory cap.
    MemoryExceeded,
    /// The job was abandoned because the pool's wall-clock cap elapsed
    /// while the job (including any requeues) was still running.
    TimeExceeded,
}

/// A job's terminal outcome, as delivered on the result queue.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The caller-supplied key identifying which input this result is for.
    pub key: JobKey,
    /// Terminal status.
    pub status: JobStatus,
    /// Extracted features, present only on `JobStatus::Success`.
    pub features: Option<FeatureMap>,
    /// Human-readable detail, e.g. the extractor's own error message or a
    /// note about how many times the job was requeued before giving up.
    pub detail: Option<String>,
}
