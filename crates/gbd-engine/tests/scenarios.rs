//! End-to-end scenarios run against a real `Pool` backed by real OS
//! threads and the real tracking allocator — nothing here is mocked,
//! since the thing under test is the concurrency and accounting itself.

use std::time::Duration;

use gbd_accountant::TrackingAllocator;
use gbd_core::{Extract, ExtractError, FeatureMap};
use gbd_engine::{Pool, PoolConfig};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new();

/// An extractor that allocates and immediately drops a buffer of a fixed
/// size, then reports its size as a feature. Deterministic and cheap,
/// useful for exercising the accounting paths without any real parsing.
struct Blob {
    bytes: usize,
}

impl Extract for Blob {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        let buf = vec![0u8; self.bytes];
        let mut out = FeatureMap::new();
        out.insert("bytes".to_string(), (buf.len() as u64).into());
        Ok(out)
    }
}

/// An extractor that always fails with its own error, never touching the
/// accounting machinery.
struct AlwaysFails;

impl Extract for AlwaysFails {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        Err(ExtractError::Malformed("poison pill".to_string()))
    }
}

/// An extractor that allocates `bytes` and holds onto it for `hold` before
/// returning, used to occupy pool capacity long enough for a sibling job's
/// growth to be briefly blocked.
struct Hog {
    bytes: usize,
    hold: Duration,
}

impl Extract for Hog {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        let buf = vec![0u8; self.bytes];
        std::thread::sleep(self.hold);
        let mut out = FeatureMap::new();
        out.insert("bytes".to_string(), (buf.len() as u64).into());
        Ok(out)
    }
}

fn wait_for(pool: &Pool, timeout: Duration) -> Vec<gbd_core::JobOutcome> {
    let deadline = std::time::Instant::now() + timeout;
    let mut out = Vec::new();
    loop {
        while let Some(outcome) = pool.poll() {
            out.push(outcome);
        }
        if pool.ready() {
            while let Some(outcome) = pool.poll() {
                out.push(outcome);
            }
            return out;
        }
        assert!(std::time::Instant::now() < deadline, "pool did not finish in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn s1_trivial_success() {
    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024).with_workers(2),
        &GLOBAL,
    );
    pool.submit("job-1".to_string(), || Box::new(Blob { bytes: 1024 }));

    let outcomes = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, gbd_core::JobStatus::Success);
    assert!(outcomes[0].features.is_some());
}

#[test]
fn s2_deterministic_memout() {
    // Cap small enough that a single job can never fit once the safety
    // buffer is subtracted.
    let pool = Pool::new(
        PoolConfig::new(1_000)
            .with_workers(1)
            .with_job_buffer(500),
        &GLOBAL,
    );
    pool.submit("too-big".to_string(), || Box::new(Blob { bytes: 10_000 }));

    let outcomes = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, gbd_core::JobStatus::MemoryExceeded);
}

#[test]
fn s3_requeue_then_succeed() {
    // The admission margin (`job_buffer_bytes`) and the job's starting
    // estimate (`initial_memnbt`) are set independently of each other here,
    // so a job's true need can outgrow its starting reservation without
    // ever being judged unfittable outright.
    let mut config = PoolConfig::new(64 * 1024 * 1024).with_workers(2);
    config.job_buffer_bytes = 1024 * 1024;
    config.initial_memnbt = 4 * 1024 * 1024;
    let pool = Pool::new(config, &GLOBAL);

    // A sibling job occupies most of the pool for a short window so the
    // real job's growth beyond its initial 4 MB estimate is blocked on its
    // first attempt, forcing a termination and requeue; once the hog
    // releases its hold, the retry succeeds.
    pool.submit("hog".to_string(), || Box::new(Hog {
        bytes: 60 * 1024 * 1024,
        hold: Duration::from_millis(150),
    }));
    std::thread::sleep(Duration::from_millis(20));
    pool.submit("grows".to_string(), || Box::new(Blob { bytes: 8 * 1024 * 1024 }));

    let outcomes = wait_for(&pool, Duration::from_secs(5));
    let reserved_after = pool.usage().reserved;
    pool.shutdown();

    assert_eq!(outcomes.len(), 2);
    let grows = outcomes
        .iter()
        .find(|o| o.key == "grows")
        .expect("the growing job produced a result");
    assert_eq!(grows.status, gbd_core::JobStatus::Success);
    assert_eq!(reserved_after, 0);
}

#[test]
fn s4_deterministic_timeout() {
    // tau = 0: a job's time budget is exhausted the instant it starts, so
    // its very first allocation after start observes TIME_EXCEEDED.
    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024)
            .with_workers(1)
            .with_time_cap(Duration::ZERO),
        &GLOBAL,
    );
    pool.submit("late".to_string(), || Box::new(Blob { bytes: 4096 }));

    let outcomes = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, gbd_core::JobStatus::TimeExceeded);
}

#[test]
fn p5_job_with_no_allocation_completes_despite_expired_time_cap() {
    struct NoAlloc;
    impl Extract for NoAlloc {
        fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
            // An empty BTreeMap performs no allocation, so this job never
            // calls back into the tracking allocator and so never observes
            // the already-expired time budget. Cancellation is cooperative
            // only: it happens at the next allocation, not asynchronously.
            Ok(FeatureMap::new())
        }
    }

    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024)
            .with_workers(1)
            .with_time_cap(Duration::ZERO),
        &GLOBAL,
    );
    pool.submit("no-alloc".to_string(), || Box::new(NoAlloc));

    let outcomes = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, gbd_core::JobStatus::Success);
}

#[test]
fn s5_parallel_throughput_and_result_identity() {
    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024).with_workers(4),
        &GLOBAL,
    );
    for i in 0..20 {
        pool.submit(format!("job-{i}"), move || Box::new(Blob { bytes: 256 + i }));
    }

    let outcomes = wait_for(&pool, Duration::from_secs(10));
    pool.shutdown();

    assert_eq!(outcomes.len(), 20);
    assert!(outcomes.iter().all(|o| o.status == gbd_core::JobStatus::Success));
    let mut keys: Vec<_> = outcomes.iter().map(|o| o.key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 20, "every job produced exactly one result");
}

#[test]
fn s6_idempotent_rerun_produces_identical_features() {
    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024).with_workers(1),
        &GLOBAL,
    );
    pool.submit("repeat".to_string(), || Box::new(Blob { bytes: 777 }));
    let first = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024).with_workers(1),
        &GLOBAL,
    );
    pool.submit("repeat".to_string(), || Box::new(Blob { bytes: 777 }));
    let second = wait_for(&pool, Duration::from_secs(5));
    pool.shutdown();

    assert_eq!(first[0].features, second[0].features);
}

/// An extractor error is a programmer/input error, not a resource limit:
/// it panics its worker thread rather than being caught into a result
/// status. Run alongside a well-formed sibling on a two-worker pool so the
/// sibling's own outcome is still observable even though the bad job's
/// worker never posts one; `Pool::shutdown` still joins every worker
/// (including the panicked one) without propagating the panic itself.
#[test]
fn extractor_failure_terminates_its_worker_without_a_result() {
    let pool = Pool::new(
        PoolConfig::new(64 * 1024 * 1024).with_workers(2),
        &GLOBAL,
    );
    pool.submit("bad-input".to_string(), || Box::new(AlwaysFails));
    pool.submit("good-input".to_string(), || Box::new(Blob { bytes: 1024 }));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut outcomes = Vec::new();
    while outcomes.is_empty() {
        while let Some(outcome) = pool.poll() {
            outcomes.push(outcome);
        }
        assert!(
            std::time::Instant::now() < deadline,
            "the well-formed sibling did not produce a result in time"
        );
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].key, "good-input");
    assert_eq!(outcomes[0].status, gbd_core::JobStatus::Success);
    pool.shutdown();
}
