//! Sweep runner: one orchestrated run per configuration, reported as CSV.

use std::io::Write;

use tracing::warn;

use crate::config::{IntervalRange, LevelingConfig};
use crate::orchestrator::{Orchestrator, RunReport};

pub const CSV_HEADER: &str = "producers,consumers,capacity,produced,processed,elapsed_ms,throughput_tasks_per_s,peak_queue_len,cpu_user_s,cpu_sys_s,degraded";

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    // SAFETY: rusage is plain data and getrusage only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    Some((seconds(usage.ru_utime), seconds(usage.ru_stime)))
}

#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Parameter grid for a sweep.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub producer_sets: Vec<usize>,
    pub consumer_sets: Vec<usize>,
    pub capacity_sets: Vec<usize>,
    /// Shared settings; counts and capacity are overridden per row.
    pub base: LevelingConfig,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            producer_sets: vec![1, 2, 4],
            consumer_sets: vec![1, 2, 4],
            capacity_sets: vec![0, 8],
            base: LevelingConfig {
                run_duration_ms: 500,
                produce_interval_ms: IntervalRange::new(0, 5),
                process_interval_ms: IntervalRange::new(1, 10),
                ..LevelingConfig::default()
            },
        }
    }
}

/// One CSV row.
#[derive(Debug, Clone)]
pub struct BenchRow {
    pub producers: usize,
    pub consumers: usize,
    pub capacity: usize,
    pub report: RunReport,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
}

impl BenchRow {
    pub fn throughput(&self) -> f64 {
        if self.report.elapsed_ms == 0 {
            return 0.0;
        }
        self.report.snapshot.processed as f64 / (self.report.elapsed_ms as f64 / 1000.0)
    }

    pub fn to_csv(&self) -> String {
        let fmt_cpu = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "NA".to_string());
        format!(
            "{},{},{},{},{},{},{:.2},{},{},{},{}",
            self.producers,
            self.consumers,
            self.capacity,
            self.report.snapshot.produced,
            self.report.snapshot.processed,
            self.report.elapsed_ms,
            self.throughput(),
            self.report.peak_queue_len,
            fmt_cpu(self.cpu_user_s),
            fmt_cpu(self.cpu_sys_s),
            self.report.degraded
        )
    }
}

pub fn bench_once(config: LevelingConfig) -> anyhow::Result<BenchRow> {
    let (producers, consumers, capacity) =
        (config.producers, config.consumers, config.queue_capacity);
    let mut orchestrator = Orchestrator::new(config)?;
    let cpu_start = cpu_times_seconds();
    let report = orchestrator.run()?;
    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };
    Ok(BenchRow {
        producers,
        consumers,
        capacity,
        report,
        cpu_user_s,
        cpu_sys_s,
    })
}

/// Run every combination and stream CSV rows to `out`.
pub fn run_sweep(sweep: &Sweep, out: &mut impl Write) -> anyhow::Result<Vec<BenchRow>> {
    if sweep.producer_sets.contains(&0) || sweep.consumer_sets.contains(&0) {
        anyhow::bail!("producer and consumer sets must be > 0");
    }
    writeln!(out, "{CSV_HEADER}")?;
    let mut rows = Vec::new();
    for &producers in &sweep.producer_sets {
        for &consumers in &sweep.consumer_sets {
            for &capacity in &sweep.capacity_sets {
                let config = LevelingConfig {
                    producers,
                    consumers,
                    queue_capacity: capacity,
                    ..sweep.base.clone()
                };
                let row = bench_once(config)?;
                writeln!(out, "{}", row.to_csv())?;
                if !row.report.snapshot.is_balanced() {
                    warn!(producers, consumers, capacity, snapshot = %row.report.snapshot, "unbalanced run");
                }
                rows.push(row);
            }
        }
    }
    Ok(rows)
}
