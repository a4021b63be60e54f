mod cli;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Parser;
use walkdir::WalkDir;

use gbd_accountant::TrackingAllocator;
use gbd_core::{Extract, ExtractError, FeatureMap, FeatureValue, JobOutcome, JobStatus};
use gbd_engine::{Pool, PoolConfig};
use gbd_extract::{cnf::BaseFeatures, identify::ContentHash};

use crate::cli::{Cli, Mode};

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

fn collect_inputs(roots: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    if files.is_empty() {
        anyhow::bail!("no input files found under {:?}", roots);
    }
    Ok(files)
}

/// Opens `path` fresh on every attempt, so a job requeued after
/// `MEMORY_EXCEEDED` restarts from a clean file handle rather than resuming
/// a partially-read one (the engine re-invokes `factory` from scratch, per
/// `Task::new`'s doc comment).
struct PathJob {
    path: PathBuf,
    mode: Mode,
}

impl Extract for PathJob {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        let file = std::fs::File::open(&self.path)?;
        match self.mode {
            Mode::Features => BaseFeatures::new(file).extract(),
            Mode::Identify => ContentHash::new(file).extract(),
        }
    }
}

fn factory_for(mode: Mode, path: PathBuf) -> impl Fn() -> Box<dyn Extract> + Send {
    move || Box::new(PathJob { path: path.clone(), mode })
}

fn feature_value_to_json(value: &FeatureValue) -> serde_json::Value {
    match value {
        FeatureValue::Number(n) => serde_json::json!(n),
        FeatureValue::Status(s) => serde_json::json!(s),
    }
}

fn features_to_json(features: &FeatureMap) -> serde_json::Value {
    serde_json::Value::Object(
        features
            .iter()
            .map(|(name, value)| (name.clone(), feature_value_to_json(value)))
            .collect(),
    )
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Success => "success",
        JobStatus::MemoryExceeded => "memout",
        JobStatus::TimeExceeded => "timeout",
    }
}

fn print_outcome(outcome: &JobOutcome) {
    let line = serde_json::json!({
        "key": outcome.key,
        "status": status_str(outcome.status),
        "features": outcome.features.as_ref().map(features_to_json),
        "detail": outcome.detail,
    });
    println!("{line}");
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let inputs = collect_inputs(&cli.inputs)?;
    log::info!("{} input file(s) discovered", inputs.len());

    let mut config = PoolConfig::new(cli.mem_cap_bytes as usize).with_workers(cli.workers as usize);
    if let Some(secs) = cli.time_cap_secs {
        config = config.with_time_cap(Duration::from_secs(secs));
    }

    let pool = Pool::new(config, &ALLOCATOR);

    for path in inputs {
        let key = path.display().to_string();
        let factory = factory_for(cli.mode, path);
        pool.submit(key, factory);
    }

    let telemetry_stop = AtomicBool::new(false);
    std::thread::scope(|scope| {
        if let Some(csv_path) = &cli.telemetry_csv {
            let period = Duration::from_millis(cli.telemetry_period_ms);
            let pool_ref = &pool;
            let stop_ref = &telemetry_stop;
            scope.spawn(move || {
                if let Err(err) = gbd_telemetry::sample_to_csv(pool_ref, csv_path, period, stop_ref) {
                    log::warn!("telemetry sampler failed: {err}");
                }
            });
        }

        loop {
            while let Some(outcome) = pool.poll() {
                print_outcome(&outcome);
            }
            if pool.ready() {
                break;
            }
            std::thread::sleep(PoolConfig::DEFAULT_IDLE_SLEEP);
        }
        while let Some(outcome) = pool.poll() {
            print_outcome(&outcome);
        }

        telemetry_stop.store(true, std::sync::atomic::Ordering::Release);
    });

    pool.shutdown();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}
