use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Parse a human-readable byte size like `512`, `512MiB`, `2GB`, defaulting
/// to mebibytes when no unit suffix is given.
pub fn parse_mem_budget_bytes(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("memory cap must not be empty".to_string());
    }

    let lower = s.to_ascii_lowercase();
    let (num, scale) = if let Some(raw) = lower.strip_suffix("kib") {
        (raw, 1024u64)
    } else if let Some(raw) = lower.strip_suffix("mib") {
        (raw, 1024u64 * 1024)
    } else if let Some(raw) = lower.strip_suffix("gib") {
        (raw, 1024u64 * 1024 * 1024)
    } else if let Some(raw) = lower.strip_suffix("kb") {
        (raw, 1000u64)
    } else if let Some(raw) = lower.strip_suffix("mb") {
        (raw, 1000u64 * 1000)
    } else if let Some(raw) = lower.strip_suffix("gb") {
        (raw, 1000u64 * 1000 * 1000)
    } else if let Some(raw) = lower.strip_suffix('b') {
        (raw, 1u64)
    } else {
        // Default unit is MiB, matching the engine's own configuration
        // surface (spec.md §6: "memory cap M (mebibytes; converted to
        // bytes internally)").
        (lower.as_str(), 1024u64 * 1024)
    };

    let num = num.trim();
    if num.is_empty() {
        return Err(format!("invalid memory cap: {input:?}"));
    }

    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid memory cap number: {input:?}"))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| format!("memory cap too large: {input:?}"))
}

fn default_workers() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as u32
}

/// Which extractor to run over each input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// DIMACS CNF base features (clause/variable counts, Horn/balance
    /// statistics, connected components).
    Features,
    /// Stable content-hash identifier of the normalized input bytes.
    Identify,
}

/// Batch feature-extraction and identification engine for CNF benchmark
/// files: walks `inputs` for files, runs the selected extractor over each
/// one under a bounded-resource worker pool, and prints one JSON result
/// line per completed job.
#[derive(Debug, Clone, Parser)]
#[command(name = "gbd", version, about)]
pub struct Cli {
    /// Files or directories to process (directories are walked recursively).
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Which extractor to run.
    #[arg(long, value_enum, env = "GBD_MODE", default_value_t = Mode::Features)]
    pub mode: Mode,

    /// Pool-wide memory cap (accepts suffixes B/KB/MB/GB/KiB/MiB/GiB;
    /// defaults to MiB when no suffix is given).
    #[arg(
        long = "mem-cap",
        env = "GBD_MEM_CAP",
        default_value = "4096",
        value_parser = parse_mem_budget_bytes,
    )]
    pub mem_cap_bytes: u64,

    /// Number of worker threads.
    #[arg(long, env = "GBD_WORKERS", default_value_t = default_workers())]
    pub workers: u32,

    /// Per-job wall-clock budget, in seconds. Omit for no time cap.
    #[arg(long = "time-cap-secs", env = "GBD_TIME_CAP_SECS")]
    pub time_cap_secs: Option<u64>,

    /// Write a `time,allocated,reserved,jobs` CSV telemetry sample to this
    /// path once per sample period. Observation only, not part of the
    /// engine's result contract.
    #[arg(long = "telemetry-csv", env = "GBD_TELEMETRY_CSV")]
    pub telemetry_csv: Option<PathBuf>,

    /// Telemetry sample period, in milliseconds.
    #[arg(
        long = "telemetry-period-ms",
        env = "GBD_TELEMETRY_PERIOD_MS",
        default_value_t = gbd_telemetry::DEFAULT_SAMPLE_PERIOD.as_millis() as u64,
    )]
    pub telemetry_period_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_number_as_mib() {
        assert_eq!(parse_mem_budget_bytes("4").unwrap(), 4 * 1024 * 1024);
    }

    #[test]
    fn parses_explicit_units() {
        assert_eq!(parse_mem_budget_bytes("512KiB").unwrap(), 512 * 1024);
        assert_eq!(parse_mem_budget_bytes("2GB").unwrap(), 2_000_000_000);
        assert_eq!(parse_mem_budget_bytes("100B").unwrap(), 100);
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(parse_mem_budget_bytes("").is_err());
        assert!(parse_mem_budget_bytes("not-a-number").is_err());
    }
}
