//! End-to-end driver runs: known identities, checkpoint determinism, and
//! fatal checkpoint corruption.
//!
//! The quartic slice is a₀ = 12881 at range parameter 1 in special mode,
//! which holds 422481⁴ = 414560⁴ + 217519⁴ + 95800⁴. Full mode runs
//! a₀ = 11337, whose even-partner phase holds
//! 2813001⁴ = 2767624⁴ + 1390400⁴ + 673865⁴. The sextic slice uses the
//! N = 1200 configuration from `common`.
//!
//! # How to run
//!
//! ```bash
//! cargo test --release --test search_tests
//! ```

mod common;

use common::*;
use eulerhunt::checkpoint::{self, CheckpointRecord};
use eulerhunt::config::EngineConfig;
use eulerhunt::output::StatsLog;
use eulerhunt::progress::Progress;
use eulerhunt::quartic::{self, Phase, QuarticParams};
use eulerhunt::sextic::{self, SexticParams};
use eulerhunt::verify::Solution;
use eulerhunt::{Family, Outcome, SearchMode, StopSignal};
use std::path::Path;

fn quartic_params() -> QuarticParams {
    QuarticParams {
        range_parameter: 1,
        mode: SearchMode::Special,
        start: KNOWN_QUARTIC_A0,
        end: KNOWN_QUARTIC_A0,
    }
}

fn full_quartic_params() -> QuarticParams {
    QuarticParams {
        range_parameter: 1,
        mode: SearchMode::Full,
        start: KNOWN_EVEN_QUARTIC_A0,
        end: KNOWN_EVEN_QUARTIC_A0,
    }
}

fn sextic_params() -> SexticParams {
    let (start, end) = KNOWN_SEXTIC_SLICE;
    SexticParams { start, end }
}

fn run_quartic(
    path: &Path,
    config: &EngineConfig,
    sink: &mut Vec<Solution>,
    stop: &dyn StopSignal,
) -> anyhow::Result<Outcome> {
    let progress = Progress::new();
    let mut ctx = context(path, config, sink, stop, &progress);
    quartic::run(&quartic_params(), config, &mut ctx)
}

/// The full-mode slice, appending stats lines to `stats`.
fn run_full_quartic(
    path: &Path,
    stats: &Path,
    sink: &mut Vec<Solution>,
    stop: &dyn StopSignal,
) -> anyhow::Result<Outcome> {
    let config = eager_config();
    let progress = Progress::new();
    let mut ctx = context(path, &config, sink, stop, &progress);
    ctx.stats = Some(StatsLog::new(stats));
    quartic::run(&full_quartic_params(), &config, &mut ctx)
}

/// Stats lines, each cut before its `time=` field.
fn finished_units(stats: &Path) -> Vec<String> {
    std::fs::read_to_string(stats)
        .unwrap()
        .lines()
        .map(|line| line.split(", time=").next().unwrap().to_string())
        .collect()
}

const BOTH_PHASES: [&str; 2] = [
    "Finished: index=11337, phase=odd-partner, range=10240000",
    "Finished: index=11337, phase=even-partner, range=10240000",
];

fn run_sextic(
    path: &Path,
    config: &EngineConfig,
    sink: &mut Vec<Solution>,
    stop: &dyn StopSignal,
) -> anyhow::Result<Outcome> {
    let progress = Progress::new();
    let mut ctx = context(path, config, sink, stop, &progress);
    sextic::run(&sextic_params(), config, &mut ctx)
}

fn lines(solutions: &[Solution]) -> Vec<String> {
    let mut lines: Vec<String> = solutions.iter().map(|s| s.to_string()).collect();
    lines.sort();
    lines
}

// ── Known Identities ────────────────────────────────────────────

#[test]
fn quartic_special_slice_finds_known_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartic.checkpoint");
    let mut found = Vec::new();
    let outcome = run_quartic(&path, &eager_config(), &mut found, &NoStop).unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert!(lines(&found).contains(&KNOWN_QUARTIC.to_string()));
    assert!(!path.exists(), "a completed slice leaves no checkpoint");
}

#[test]
fn quartic_full_slice_runs_both_phases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartic.checkpoint");
    let stats = dir.path().join("stats.txt");
    let mut found = Vec::new();
    let outcome = run_full_quartic(&path, &stats, &mut found, &NoStop).unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(lines(&found), vec![KNOWN_EVEN_QUARTIC.to_string()]);
    assert_eq!(finished_units(&stats), BOTH_PHASES);
    assert!(!path.exists());
}

#[test]
fn sextic_slice_finds_known_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sextic.checkpoint");
    let mut found = Vec::new();
    let outcome = run_sextic(&path, &small_sextic_config(), &mut found, &NoStop).unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(lines(&found), vec![KNOWN_SEXTIC.to_string()]);
    assert!(!path.exists());
}

#[test]
fn stats_get_one_line_per_finished_unit() {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("stats.txt");
    let config = small_sextic_config();
    let progress = Progress::new();
    let mut found = Vec::new();
    let mut ctx = context(&dir.path().join("cp"), &config, &mut found, &NoStop, &progress);
    ctx.stats = Some(StatsLog::new(&stats_path));
    let params = SexticParams { start: 10, end: 11 };
    sextic::run(&params, &config, &mut ctx).unwrap();
    let text = std::fs::read_to_string(&stats_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Finished: index=10, phase=probe, range=1200, time="));
}

// ── Checkpoint Determinism ──────────────────────────────────────

/// Interrupt after `stop_after` polls, then resume to completion.
fn quartic_interrupted(stop_after: u32) -> Vec<String> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartic.checkpoint");
    let config = eager_config();
    let mut found = Vec::new();
    let first = run_quartic(&path, &config, &mut found, &StopAfter::new(stop_after)).unwrap();
    assert_eq!(first, Outcome::Interrupted);
    assert!(path.exists());
    let second = run_quartic(&path, &config, &mut found, &NoStop).unwrap();
    assert_eq!(second, Outcome::Completed);
    lines(&found)
}

#[test]
fn quartic_resume_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut straight = Vec::new();
    run_quartic(&dir.path().join("cp"), &eager_config(), &mut straight, &NoStop).unwrap();
    let straight = lines(&straight);
    // The known pair sits at the ninth partner residue: stop before and after it.
    for stop_after in [3, 20] {
        assert_eq!(quartic_interrupted(stop_after), straight, "stop after {}", stop_after);
    }
}

/// The 32 odd partners poll first. Poll 40 stops eight residues into the
/// even phase; poll 1950 stops after b₀ = 15112, the 1890th even residue,
/// which carries the identity.
#[test]
fn quartic_resume_crosses_phase_boundary() {
    let dir = tempfile::tempdir().unwrap();
    for stop_after in [40u32, 1950] {
        let path = dir.path().join(format!("full-{}.checkpoint", stop_after));
        let stats = dir.path().join(format!("full-{}.stats", stop_after));
        let mut found = Vec::new();
        let first = run_full_quartic(&path, &stats, &mut found, &StopAfter::new(stop_after)).unwrap();
        assert_eq!(first, Outcome::Interrupted);
        let record = checkpoint::load(&path, Family::Quartic, |_| Ok(())).unwrap().unwrap();
        assert_eq!(record.current_index, KNOWN_EVEN_QUARTIC_A0);
        assert_eq!(record.phase, Phase::EvenPartner.marker());
        assert_eq!(record.inner_start, (stop_after as u64 - 33) * 8 + 1);
        assert_eq!(finished_units(&stats), BOTH_PHASES[..1]);

        let second = run_full_quartic(&path, &stats, &mut found, &NoStop).unwrap();
        assert_eq!(second, Outcome::Completed);
        assert_eq!(lines(&found), vec![KNOWN_EVEN_QUARTIC.to_string()], "stop after {}", stop_after);
        assert_eq!(finished_units(&stats), BOTH_PHASES);
        assert!(!path.exists());
    }
}

#[test]
fn sextic_resume_matches_uninterrupted_run() {
    let config = small_sextic_config();
    let dir = tempfile::tempdir().unwrap();
    let mut straight = Vec::new();
    run_sextic(&dir.path().join("cp"), &config, &mut straight, &NoStop).unwrap();
    let straight = lines(&straight);

    // 99 polls per index: one after stage 1, one per class. Poll 1 stops
    // right after the first index build; 150 stops mid-probe of 4896.
    for stop_after in [1, 150] {
        let path = dir.path().join(format!("sextic-{}.checkpoint", stop_after));
        let mut found = Vec::new();
        let first = run_sextic(&path, &config, &mut found, &StopAfter::new(stop_after)).unwrap();
        assert_eq!(first, Outcome::Interrupted);
        let record = checkpoint::load(&path, Family::Sextic, |_| Ok(())).unwrap().unwrap();
        assert_eq!(record.phase, sextic::Stage::Probe.marker());
        let second = run_sextic(&path, &config, &mut found, &NoStop).unwrap();
        assert_eq!(second, Outcome::Completed);
        assert_eq!(lines(&found), straight, "stop after {}", stop_after);
    }
}

// ── Checkpoint Corruption ───────────────────────────────────────

#[test]
fn corrupt_checkpoint_is_fatal_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartic.checkpoint");
    std::fs::write(&path, "family=quartic\nrange_parameter=banana\n").unwrap();
    let mut found = Vec::new();
    assert!(run_quartic(&path, &eager_config(), &mut found, &NoStop).is_err());
    assert!(!path.exists());
    assert!(found.is_empty());
}

#[test]
fn checkpoint_for_another_slice_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartic.checkpoint");
    let record = CheckpointRecord {
        family: Family::Quartic,
        range_parameter: 2,
        mode: SearchMode::Special,
        start_index: KNOWN_QUARTIC_A0,
        end_index: KNOWN_QUARTIC_A0,
        current_index: KNOWN_QUARTIC_A0,
        phase: 0,
        inner_start: 0,
    };
    checkpoint::save(&path, &record).unwrap();
    let mut found = Vec::new();
    let err = run_quartic(&path, &eager_config(), &mut found, &NoStop).unwrap_err();
    assert!(format!("{:#}", err).contains("range parameter 2"), "{:#}", err);
    assert!(!path.exists());
}

#[test]
fn sextic_checkpoint_is_not_a_quartic_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.checkpoint");
    let config = small_sextic_config();
    let mut found = Vec::new();
    let first = run_sextic(&path, &config, &mut found, &StopAfter::new(1)).unwrap();
    assert_eq!(first, Outcome::Interrupted);
    assert!(run_quartic(&path, &eager_config(), &mut found, &NoStop).is_err());
}
