use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use queue_leveling::bench::{self, Sweep};
use queue_leveling::config::{IntervalRange, LevelingConfig, ShutdownMode};
use queue_leveling::logging;
use queue_leveling::orchestrator::{Orchestrator, RunReport};
use queue_leveling::report::{SummaryReport, publish_report};
use queue_leveling::status::{LogStatusSink, StatusMonitor};

/// Queue-based load leveling simulator.
#[derive(Parser, Debug)]
#[command(name = "queue_leveling", args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one leveling simulation (default)
    Run(RunArgs),
    /// Sweep producer/consumer/capacity combinations and print CSV
    Bench(BenchArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    producers: Option<usize>,

    #[arg(long)]
    consumers: Option<usize>,

    /// Length of the run window
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Queue bound, 0 for unbounded
    #[arg(long)]
    capacity: Option<usize>,

    /// Producer delay between tasks, MIN,MAX or a fixed value
    #[arg(long, value_parser = parse_interval)]
    produce_ms: Option<IntervalRange>,

    /// Consumer processing time, MIN,MAX or a fixed value
    #[arg(long, value_parser = parse_interval)]
    process_ms: Option<IntervalRange>,

    /// Insert one relayed sentinel instead of one per consumer
    #[arg(long)]
    relay: bool,

    /// Status log interval
    #[arg(long)]
    status_ms: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Skip the descriptive report
    #[arg(long)]
    no_report: bool,
}

#[derive(Args, Debug)]
struct BenchArgs {
    #[arg(long, value_delimiter = ',', default_values_t = [1usize, 2, 4])]
    producers: Vec<usize>,

    #[arg(long, value_delimiter = ',', default_values_t = [1usize, 2, 4])]
    consumers: Vec<usize>,

    #[arg(long, value_delimiter = ',', default_values_t = [0usize, 8])]
    capacities: Vec<usize>,

    /// Window per combination
    #[arg(long, default_value_t = 500)]
    duration_ms: u64,
}

fn parse_interval(text: &str) -> Result<IntervalRange, String> {
    IntervalRange::parse(text).map_err(|err| err.to_string())
}

fn build_config(args: &RunArgs) -> Result<LevelingConfig> {
    let mut config = match &args.config {
        Some(path) => LevelingConfig::from_toml_file(path)?,
        None => LevelingConfig::default(),
    };
    if let Some(producers) = args.producers {
        config.producers = producers;
    }
    if let Some(consumers) = args.consumers {
        config.consumers = consumers;
    }
    if let Some(duration_ms) = args.duration_ms {
        config.run_duration_ms = duration_ms;
    }
    if let Some(capacity) = args.capacity {
        config.queue_capacity = capacity;
    }
    if let Some(range) = args.produce_ms {
        config.produce_interval_ms = range;
    }
    if let Some(range) = args.process_ms {
        config.process_interval_ms = range;
    }
    if args.relay {
        config.shutdown = ShutdownMode::Relay;
    }
    if let Some(status_ms) = args.status_ms {
        config.status_interval_ms = status_ms;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(report: &RunReport) {
    println!("RUN SUMMARY");
    println!("produced={}", report.snapshot.produced);
    println!("processed={}", report.snapshot.processed);
    println!("in_flight={}", report.snapshot.in_flight);
    println!("balanced={}", report.snapshot.is_balanced());
    println!("sentinels_inserted={}", report.sentinels_inserted);
    println!("relays={}", report.relays);
    println!("leftover={}", report.leftover);
    println!("peak_queue_len={}", report.peak_queue_len);
    println!("elapsed_ms={}", report.elapsed_ms);
    println!("degraded={}", report.degraded);
}

fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    let mut orchestrator = Orchestrator::new(config.clone())?;
    let monitor = StatusMonitor::spawn(
        orchestrator.status_probe(),
        config.status_interval(),
        LogStatusSink,
    )
    .context("failed to spawn status monitor")?;

    let result = orchestrator.run();
    monitor.stop();
    let report = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if args.no_report {
        return Ok(());
    }
    if let Some(text) = publish_report(&SummaryReport, &report.snapshot) {
        println!("REPORT");
        println!("{text}");
    }
    Ok(())
}

fn run_bench(args: &BenchArgs) -> Result<()> {
    let defaults = Sweep::default();
    let sweep = Sweep {
        producer_sets: args.producers.clone(),
        consumer_sets: args.consumers.clone(),
        capacity_sets: args.capacities.clone(),
        base: LevelingConfig {
            run_duration_ms: args.duration_ms,
            ..defaults.base
        },
    };
    let rows = bench::run_sweep(&sweep, &mut std::io::stdout().lock())?;
    info!(rows = rows.len(), "bench finished");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose));
    match &cli.command {
        Some(Command::Run(args)) => run(args),
        Some(Command::Bench(args)) => run_bench(args),
        None => run(&cli.run),
    }
}
