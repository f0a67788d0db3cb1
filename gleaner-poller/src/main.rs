// Gleaner Poller - Command line entry point
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Gleaner Poller
//!
//! ## Usage
//!
//! ```bash
//! # Poll every object of a configuration file
//! gleaner-poller --config poller.yaml
//!
//! # Replay a single dataset through the perf engine, three polls, 1s apart
//! gleaner-poller --csv volume.csv --object volume --counters counters.yaml \
//!     --interval 1s --polls 3
//! ```

use clap::Parser;
use gleaner::parse_duration;
use gleaner_poller::{ObjectConfig, Output, PollerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Gleaner metrics poller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Poller configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV dataset to replay when no configuration is given
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Object name of the replayed dataset
    #[arg(long, default_value = "volume")]
    object: String,

    /// Counter schema of the replayed dataset
    #[arg(long)]
    counters: Option<PathBuf>,

    /// Poll interval override (e.g. 30s, 1m)
    #[arg(short, long)]
    interval: Option<String>,

    /// Stop after this many polls per object
    #[arg(short, long)]
    polls: Option<u64>,

    /// Write `<object>.jsonl` files here instead of stdout
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Only log a summary per matrix
    #[arg(long)]
    log_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> gleaner_poller::Result<PollerConfig> {
    let mut config = match (&args.config, &args.csv) {
        (Some(path), _) => PollerConfig::from_file(path)?,
        (None, Some(csv)) => {
            let mut object = ObjectConfig::new(args.object.as_str()).with_csv(csv);
            if let Some(counters) = &args.counters {
                object = object.with_counters(counters);
            }
            PollerConfig::default().with_object(object)
        }
        (None, None) => {
            return Err(gleaner_poller::PollerError::Config(
                "either --config or --csv is required".into(),
            ))
        }
    };
    if let Some(raw) = &args.interval {
        config = config.with_poll_interval(parse_duration(raw)?);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    // logs go to stderr, stdout carries the data points
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Gleaner Poller v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let output = match (&args.output_dir, args.log_only) {
        (_, true) => Output::Log,
        (Some(dir), false) => Output::Directory(dir.clone()),
        (None, false) => Output::Stdout,
    };

    match gleaner_poller::run(config, output, args.polls).await {
        Ok(finished) => {
            for (object, stats) in finished {
                info!(
                    "{}: {} polls, {} timeouts, {} errors, {} points exported",
                    object, stats.polls, stats.timeouts, stats.errors, stats.exported
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Poller failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
