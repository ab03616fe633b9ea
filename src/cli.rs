//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the execution
//! logic for each subcommand: driver dispatch with checkpoint, solution and
//! progress plumbing, tuple verification, and pair plans.

use anyhow::{bail, Result};
use eulerhunt::checkpoint::Checkpointer;
use eulerhunt::config::{load_config, validate_config, EngineConfig};
use eulerhunt::output::{SolutionLog, StatsLog};
use eulerhunt::progress::Progress;
use eulerhunt::quartic::{self, PairChecker, QuarticParams, QuarticTables, BLOCK, MAX_RANGE_PARAMETER};
use eulerhunt::sextic::{self, SexticParams};
use eulerhunt::{Deadline, Family, Outcome, RunContext, SearchMode};
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

use super::Cli;

// ── Search Dispatch ─────────────────────────────────────────────

pub fn run_quartic(cli: &Cli, range_parameter: u64, mode: SearchMode, start: u64, end: u64) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let params = QuarticParams {
        range_parameter,
        mode,
        start,
        end,
    };
    params.validate()?;
    let _span = info_span!("quartic", range_parameter, %mode).entered();
    run_driver(cli, &config, Family::Quartic, |ctx| quartic::run(&params, &config, ctx))
}

pub fn run_sextic(cli: &Cli, range: Option<u64>, start: u64, end: u64) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(range) = range {
        config.sextic.range = range;
        validate_config(&config)?;
    }
    let params = SexticParams { start, end };
    params.validate(&config.sextic)?;
    let _span = info_span!("sextic", range = config.sextic.range).entered();
    run_driver(cli, &config, Family::Sextic, |ctx| sextic::run(&params, &config, ctx))
}

/// Wire up the files, stop budget and progress reporter around one driver
/// run, then report how it ended.
fn run_driver(
    cli: &Cli,
    config: &EngineConfig,
    family: Family,
    drive: impl FnOnce(&mut RunContext<'_>) -> Result<Outcome>,
) -> Result<()> {
    let mut solutions = SolutionLog::open(&cli.solutions)?;
    let deadline = cli.max_seconds.map(|secs| Deadline::after(Duration::from_secs(secs)));
    let progress = Progress::new();
    let reporter_handle = progress.start_reporter();

    let mut ctx = RunContext {
        checkpoint: Checkpointer::new(
            &cli.checkpoint,
            Duration::from_secs(config.checkpoint_interval_secs),
        ),
        solutions: &mut solutions,
        stats: cli.stats.as_deref().map(StatsLog::new),
        stop: &deadline,
        progress: &*progress,
    };

    let search_start = Instant::now();
    let result = drive(&mut ctx);

    progress.stop();
    if reporter_handle.join().is_err() {
        warn!("progress reporter panicked");
    }
    progress.print_status();

    match result? {
        Outcome::Completed => info!(
            %family,
            elapsed_secs = search_start.elapsed().as_secs(),
            solutions = solutions.len(),
            "search complete"
        ),
        Outcome::Interrupted => info!(
            %family,
            checkpoint = %cli.checkpoint.display(),
            "search interrupted; rerun the same command to resume"
        ),
    }
    Ok(())
}

// ── Verification ────────────────────────────────────────────────

/// Reconstruct the one missing right-hand term and print the certified
/// identity. Fails when the terms do not complete an identity.
pub fn run_verify(cli: &Cli, family: Family, terms: &[u64]) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let (left, right) = family.arity();
    if terms.len() != left + right - 1 {
        bail!(
            "{} verification takes {} terms, got {}",
            family,
            left + right - 1,
            terms.len()
        );
    }
    let (lhs, known) = terms.split_at(left);

    let reconstructor = match family {
        Family::Quartic => quartic::reconstructor(&config)?,
        Family::Sextic => sextic::reconstructor(&config)?,
    };
    // Every right-hand term is below the sum of the left-hand ones.
    let bound: u64 = lhs.iter().sum();
    if !reconstructor
        .verification()
        .certifies(bound, family.exponent(), right)
    {
        bail!("configured verification primes cannot certify terms below {}", bound);
    }
    if bound > reconstructor.reach() {
        bail!("auxiliary primes cannot reconstruct terms below {}", bound);
    }

    match reconstructor.complete(lhs, known, bound) {
        Some(solution) => {
            info!(%family, primitive = solution.primitive, "identity certified");
            println!("{}", solution);
            Ok(())
        }
        None => bail!("{:?} do not complete a {} identity", terms, family),
    }
}

// ── Pair Plans ──────────────────────────────────────────────────

/// Print the filter and fold plan `check` would use for (a, b), or `null`
/// when the pair is rejected before the fold.
pub fn run_plan(cli: &Cli, a: u64, b: u64) -> Result<()> {
    if b == 0 || a <= b {
        bail!("plan needs a > b > 0");
    }
    let config = load_config(cli.config.as_deref())?;
    let range_parameter = a / BLOCK + 1;
    if range_parameter > MAX_RANGE_PARAMETER {
        bail!("a = {} exceeds the largest supported range", a);
    }
    let tables = QuarticTables::new(range_parameter * BLOCK)?;
    let mut checker = PairChecker::new(&tables, &config.quartic, quartic::reconstructor(&config)?);
    let plan = checker.plan(a, b);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
