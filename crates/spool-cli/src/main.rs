//! Spool command-line demos
//!
//! Small programs that exercise the cooperative scheduler: sleeping
//! counters, callback chains, and a TCP echo server.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use spool_core::SchedulerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const MAX_TICK_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Single-threaded cooperative scheduler demos", long_about = None)]
#[command(version)]
struct Cli {
    /// Scheduler config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "spool_core=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two sleeping counters sharing one scheduler
    Countdown {
        /// Countdown start
        #[arg(long, default_value_t = 5)]
        down: u32,
        /// Countup limit
        #[arg(long, default_value_t = 20)]
        up: u32,
        /// Length of one tick in milliseconds (at most one day)
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..=MAX_TICK_MS))]
        tick_ms: u64,
    },

    /// The same counters written as chained callbacks
    Callbacks {
        /// Countdown start
        #[arg(long, default_value_t = 5)]
        down: u32,
        /// Countup limit
        #[arg(long, default_value_t = 20)]
        up: u32,
        /// Length of one tick in milliseconds (at most one day)
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..=MAX_TICK_MS))]
        tick_ms: u64,
    },

    /// Drive a generator-style unit outside the scheduler
    Generate {
        /// Countdown start
        #[arg(default_value_t = 10)]
        from: i64,
    },

    /// TCP echo server with one task per connection
    Echo {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:25000")]
        addr: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SchedulerConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading {}", path.display()),
        None => "loading config from environment".to_string(),
    })?;
    init_logging(cli.log_level.as_deref().or(config.log_level.as_deref()));

    match cli.command {
        Commands::Countdown { down, up, tick_ms } => commands::countdown::execute(config, down, up, tick_ms),
        Commands::Callbacks { down, up, tick_ms } => commands::callbacks::execute(config, down, up, tick_ms),
        Commands::Generate { from } => commands::generate::execute(from),
        Commands::Echo { addr } => commands::echo::execute(config, &addr),
    }
}

/// Install the fmt subscriber.
///
/// Priority: `--log-level` > config `log_level` > `RUST_LOG` > "info".
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
