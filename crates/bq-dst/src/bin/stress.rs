//! bq-stress: run the queue under real producer/consumer threads.
//!
//! # Usage
//!
//! ```bash
//! bq-stress --producers 8 --consumers 8 --items 100000 --capacity 4
//! bq-stress --config stress.json --strategy monitor
//! RUST_LOG=bq_queue=debug bq-stress --items 100
//! ```
//!
//! Prints a JSON array with one report per strategy. Exits with status 1
//! if any run failed.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bq_dst::{StrategyKind, StressConfig, StressReport, run_stress};

#[derive(Parser, Debug)]
#[command(name = "bq-stress")]
#[command(about = "Stress the bounded blocking queue with real threads")]
struct Cli {
    /// JSON file with a base `StressConfig`; flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    producers: Option<usize>,

    #[arg(long)]
    consumers: Option<usize>,

    /// Items enqueued by each producer.
    #[arg(long)]
    items: Option<u64>,

    #[arg(long)]
    capacity: Option<usize>,

    /// Strategies to run (repeatable). Runs all of them if not given.
    #[arg(long, value_enum)]
    strategy: Vec<StrategyKind>,

    /// Consumer stall timeout in milliseconds.
    #[arg(long)]
    stall_timeout_ms: Option<u64>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bq_queue=info,bq_dst=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<StressConfig, String> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
            serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {}", path.display(), e))?
        }
        None => StressConfig::default(),
    };
    if let Some(producers) = cli.producers {
        config.producers = producers;
    }
    if let Some(consumers) = cli.consumers {
        config.consumers = consumers;
    }
    if let Some(items) = cli.items {
        config.items_per_producer = items;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    if let Some(timeout) = cli.stall_timeout_ms {
        config.stall_timeout_ms = timeout;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let base = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };
    let strategies = if cli.strategy.is_empty() {
        StrategyKind::all().to_vec()
    } else {
        cli.strategy.clone()
    };

    let mut reports: Vec<StressReport> = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let config = StressConfig { strategy, ..base.clone() };
        match run_stress(&config) {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(2);
            }
        }
    }

    let output = if cli.pretty {
        serde_json::to_string_pretty(&reports)
    } else {
        serde_json::to_string(&reports)
    };
    match output {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: failed to serialize report: {e}");
            process::exit(2);
        }
    }

    if !reports.iter().all(|r| r.passed) {
        process::exit(1);
    }
}
