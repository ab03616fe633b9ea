//! # Main — CLI Entry Point
//!
//! Routes subcommands to the search drivers and the utility commands.
//! Handles the shared concerns: logging setup, `.env` loading, engine
//! configuration, and the checkpoint, solution and statistics paths.
//!
//! ## Subcommands
//!
//! - `quartic`: Euler(4,1,3) slice over outer residues a₀ (mod 2¹⁴).
//! - `sextic`: Euler(6,2,5) slice over outer indices i (mod p).
//! - `verify`: reconstruct the missing term of a tuple and certify it.
//! - `plan`: print the quartic filter and fold plan for one pair as JSON.
//!
//! ## Global Options
//!
//! - `--config` / `EULERHUNT_CONFIG`: TOML engine configuration.
//! - `--checkpoint`: key=value resume file for the running slice.
//! - `--solutions`: append-only file of certified identities.
//! - `--stats`: append-only per-unit timing file.
//! - `--max-seconds`: stop (with a checkpoint) once this budget is spent.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eulerhunt::{Family, SearchMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "eulerhunt", about = "Search for Euler power-sum identities")]
struct Cli {
    /// Engine configuration TOML (or set EULERHUNT_CONFIG); defaults when absent
    #[arg(long, env = "EULERHUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to checkpoint file for resuming searches
    #[arg(long, default_value = "eulerhunt.checkpoint")]
    checkpoint: PathBuf,

    /// File certified solutions are appended to
    #[arg(long, default_value = "solutions.txt")]
    solutions: PathBuf,

    /// File per-unit run statistics are appended to (disabled when unset)
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Save a checkpoint and stop after this many seconds
    #[arg(long)]
    max_seconds: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a⁴ = b⁴ + c⁴ + d⁴ over a slice of outer residues a₀ (mod 16384)
    Quartic {
        /// Range parameter R; terms are below R·10,240,000
        #[arg(long)]
        range_parameter: u64,
        /// Search every sub-phase, or only the odd-partner one
        #[arg(long, value_enum, default_value_t = SearchMode::Full)]
        mode: SearchMode,
        /// First outer residue a₀
        #[arg(long)]
        start: u64,
        /// Last outer residue a₀ (inclusive)
        #[arg(long)]
        end: u64,
    },
    /// Search a⁶ + b⁶ = c⁶ + d⁶ + e⁶ + f⁶ + g⁶ over a slice of outer indices
    Sextic {
        /// Term bound N (overrides the configured range)
        #[arg(long)]
        range: Option<u64>,
        /// First outer index i
        #[arg(long)]
        start: u64,
        /// Last outer index i (inclusive)
        #[arg(long)]
        end: u64,
    },
    /// Reconstruct the missing term of a tuple and certify the identity
    Verify {
        /// Identity family
        #[arg(long, value_enum)]
        family: Family,
        /// Known terms: quartic `a b c`, sextic `a b c d e f`
        #[arg(long, num_args = 1.., required = true)]
        terms: Vec<u64>,
    },
    /// Print the quartic filter and fold plan for one pair as JSON
    Plan {
        /// Left-hand term a
        #[arg(long)]
        a: u64,
        /// Right-hand term b (a > b)
        #[arg(long)]
        b: u64,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for log shipping, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Quartic {
            range_parameter,
            mode,
            start,
            end,
        } => cli::run_quartic(&cli, *range_parameter, *mode, *start, *end),
        Commands::Sextic { range, start, end } => cli::run_sextic(&cli, *range, *start, *end),
        Commands::Verify { family, terms } => cli::run_verify(&cli, *family, terms),
        Commands::Plan { a, b } => cli::run_plan(&cli, *a, *b),
    }
}
