//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use eulerhunt::checkpoint::Checkpointer;
use eulerhunt::config::{parse_toml, EngineConfig};
use eulerhunt::output::SolutionSink;
use eulerhunt::progress::Progress;
use eulerhunt::{RunContext, StopSignal};

/// The sextic engine at N = 1200 with 7³ classes. Small enough for debug
/// builds, large enough to contain
/// 1117⁶ + 770⁶ = 1092⁶ + 861⁶ + 602⁶ + 212⁶ + 84⁶.
pub const SMALL_SEXTIC_TOML: &str = r#"
checkpoint_interval_secs = 0

[sextic]
range = 1200
key_prime = 20021
class_exponent = 3
bucket_modulus = 10007
"#;

pub const KNOWN_QUARTIC: &str = "422481^4 = 414560^4 + 217519^4 + 95800^4 (primitive)";
pub const KNOWN_SEXTIC: &str = "1117^6 + 770^6 = 1092^6 + 861^6 + 602^6 + 212^6 + 84^6 (primitive)";

/// a₀ = 422481 mod 16384.
pub const KNOWN_QUARTIC_A0: u64 = 12_881;

/// The 5-adic unit term 2767624 is even, so this one is only reached by the
/// even-partner phase of a full-mode search.
pub const KNOWN_EVEN_QUARTIC: &str = "2813001^4 = 2767624^4 + 1390400^4 + 673865^4 (primitive)";

/// a₀ = 2813001 mod 16384.
pub const KNOWN_EVEN_QUARTIC_A0: u64 = 11_337;

/// Outer indices around the one the known sextic identity lands on for
/// the small configuration.
pub const KNOWN_SEXTIC_SLICE: (u64, u64) = (4_895, 4_899);

pub fn small_sextic_config() -> EngineConfig {
    parse_toml(SMALL_SEXTIC_TOML).unwrap()
}

/// Defaults, with a checkpoint written at every boundary.
pub fn eager_config() -> EngineConfig {
    EngineConfig {
        checkpoint_interval_secs: 0,
        ..EngineConfig::default()
    }
}

/// Requests a stop on the `after`-th poll and every poll after it.
pub struct StopAfter {
    polls: Cell<u32>,
    after: u32,
}

impl StopAfter {
    pub fn new(after: u32) -> Self {
        StopAfter {
            polls: Cell::new(0),
            after,
        }
    }
}

impl StopSignal for StopAfter {
    fn is_stop_requested(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        polls >= self.after
    }
}

/// Never stops.
pub struct NoStop;

impl StopSignal for NoStop {
    fn is_stop_requested(&self) -> bool {
        false
    }
}

/// A context writing its checkpoint to `checkpoint`.
pub fn context<'a>(
    checkpoint: &Path,
    config: &EngineConfig,
    solutions: &'a mut dyn SolutionSink,
    stop: &'a dyn StopSignal,
    progress: &'a Progress,
) -> RunContext<'a> {
    RunContext {
        checkpoint: Checkpointer::new(
            checkpoint,
            Duration::from_secs(config.checkpoint_interval_secs),
        ),
        solutions,
        stats: None,
        stop,
        progress,
    }
}
