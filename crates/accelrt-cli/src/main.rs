//! accelrt CLI - Inspect and exercise accelrt devices.
//!
//! # Commands
//!
//! - `accelrt info` - Report backend, device memory and pool counters
//! - `accelrt trim` - Release cached pool memory
//! - `accelrt bench-copy` - Time host/device copies with events
//! - `accelrt random` - Sample a device-side random fill
//!
//! # Examples
//!
//! ```bash
//! # Memory report for the simulator as JSON
//! accelrt --backend sim info --json
//!
//! # Copy timing with 16 MiB buffers
//! accelrt bench-copy --size 16M --iterations 20
//!
//! # Draw 1001 normal samples (1002 are written)
//! accelrt random --distribution normal --count 1001 --mean 0 --stddev 2
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

use commands::random::Distribution;
use commands::{bench_copy, info, parse_size, random, trim, Session};

/// accelrt CLI - device memory and stream-ordered execution tooling
#[derive(Parser)]
#[command(name = "accelrt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Backend override (sim, cuda, auto)
    #[arg(short, long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report backend, device memory and pool counters
    Info {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Release cached pool memory
    Trim {
        /// Bytes of reserved memory to keep
        #[arg(short, long, default_value = "0", value_parser = parse_size)]
        keep: u64,

        /// Allocate and free this many bytes first
        #[arg(short, long, default_value = "0", value_parser = parse_size)]
        warm: u64,
    },

    /// Time host/device copies with events
    BenchCopy {
        /// Buffer size
        #[arg(short, long, default_value = "4M", value_parser = parse_size)]
        size: u64,

        /// Copies per direction
        #[arg(short, long, default_value = "10")]
        iterations: u32,
    },

    /// Sample a device-side random fill
    Random {
        /// Distribution to draw from
        #[arg(short, long, value_enum, default_value = "uniform")]
        distribution: Distribution,

        /// Number of values
        #[arg(short = 'n', long, default_value = "1024")]
        count: u64,

        /// Mean of the normal distribution
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        mean: f32,

        /// Standard deviation of the normal distribution
        #[arg(long, default_value = "1.0")]
        stddev: f32,

        /// Number of values to print
        #[arg(long, default_value = "8")]
        show: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> error::CliResult<()> {
    if let Commands::Completions { shell } = cli.command {
        use clap::CommandFactory;
        clap_complete::generate(shell, &mut Cli::command(), "accelrt", &mut std::io::stdout());
        return Ok(());
    }

    let session = Session::open(cli.config.as_deref(), cli.backend.as_deref())?;

    match cli.command {
        Commands::Info { json } => info::execute(&session, json),
        Commands::Trim { keep, warm } => trim::execute(&session, keep, warm),
        Commands::BenchCopy { size, iterations } => bench_copy::execute(&session, size, iterations),
        Commands::Random {
            distribution,
            count,
            mean,
            stddev,
            show,
        } => random::execute(&session, distribution, count, mean, stddev, show),
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
