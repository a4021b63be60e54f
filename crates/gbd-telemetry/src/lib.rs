#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Optional CSV telemetry sampler for a running job pool.
//!
//! This is observation only — not part of the engine's contract. It samples
//! `Pool::usage()` at a fixed period and appends one row per sample to a CSV
//! file with columns `time`, `allocated`, `reserved`, `jobs`. Per-worker
//! `allocated` reads are torn on purpose (the registry's supervisor snapshot
//! is best-effort, per the engine's own design notes): a sampler reading a
//! worker mid-update may see a stale or half-updated value, which is
//! acceptable for a telemetry stream that is never used for admission
//! decisions.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gbd_engine::Pool;

/// Default period between samples, matching the supervisor sample period
/// named in the engine's own constants.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(20);

/// Sample `pool` on `period` and append one CSV row per sample to `path`
/// until `stop` is set. Intended to run on a dedicated thread (e.g. spawned
/// inside a `std::thread::scope` alongside the pool's owner), since it
/// blocks for the duration of sampling.
///
/// Returns as soon as `stop` is observed true, or on the first write/flush
/// failure (logged and treated as fatal to the sampler, never to the pool
/// it is observing).
pub fn sample_to_csv(
    pool: &Pool,
    path: impl AsRef<Path>,
    period: Duration,
    stop: &AtomicBool,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "time,allocated,reserved,jobs")?;
    writer.flush()?;

    let epoch = Instant::now();
    while !stop.load(Ordering::Acquire) {
        if let Err(err) = write_sample(&mut writer, pool, epoch) {
            log::warn!("telemetry sampler stopping after write failure: {err}");
            return Err(err);
        }
        std::thread::sleep(period);
    }
    Ok(())
}

fn write_sample(writer: &mut impl Write, pool: &Pool, epoch: Instant) -> io::Result<()> {
    let usage = pool.usage();
    let allocated: usize = usage.workers.iter().map(|w| w.allocated).sum();
    writeln!(
        writer,
        "{:.3},{},{},{}",
        epoch.elapsed().as_secs_f64(),
        allocated,
        usage.reserved,
        usage.active_jobs,
    )?;
    writer.flush()
}
