//! # eulerhunt — Meet-in-the-Middle Search for Euler Power-Sum Identities
//!
//! Searches for integer solutions of
//!
//! - **Euler(4,1,3)**: a⁴ = b⁴ + c⁴ + d⁴ ([`quartic`])
//! - **Euler(6,2,5)**: a⁶ + b⁶ = c⁶ + d⁶ + e⁶ + f⁶ + g⁶ ([`sextic`])
//!
//! Both drivers share the same engine: residue tables ([`residue`]), sound
//! power-residue filters ([`filter`]), a balanced fingerprint fold
//! ([`fold`]) over an arena-chained bucket store ([`index`]), and
//! multi-prime certification with modular root reconstruction ([`verify`]).
//! Long slices resume from a key=value checkpoint ([`checkpoint`]).

pub mod checkpoint;
pub mod config;
pub mod filter;
pub mod fold;
pub mod index;
pub mod output;
pub mod progress;
pub mod quartic;
pub mod residue;
pub mod sextic;
pub mod sieve;
pub mod verify;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which identity a search or checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// a⁴ = b⁴ + c⁴ + d⁴
    Quartic,
    /// a⁶ + b⁶ = c⁶ + d⁶ + e⁶ + f⁶ + g⁶
    Sextic,
}

impl Family {
    pub fn exponent(self) -> u32 {
        match self {
            Family::Quartic => 4,
            Family::Sextic => 6,
        }
    }

    /// Number of terms on the left and right of the identity.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Family::Quartic => (1, 3),
            Family::Sextic => (2, 5),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Quartic => write!(f, "quartic"),
            Family::Sextic => write!(f, "sextic"),
        }
    }
}

impl FromStr for Family {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "quartic" => Ok(Family::Quartic),
            "sextic" => Ok(Family::Sextic),
            other => anyhow::bail!("unknown family '{}'", other),
        }
    }
}

/// Full search versus the restricted special-case search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Every sub-phase.
    Full,
    /// Only the fast odd-partner sub-phase.
    Special,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Full => write!(f, "full"),
            SearchMode::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "full" => Ok(SearchMode::Full),
            "special" => Ok(SearchMode::Special),
            other => anyhow::bail!("unknown search mode '{}'", other),
        }
    }
}

/// Polled at checkpoint boundaries; a `true` answer saves a checkpoint and
/// returns [`Outcome::Interrupted`].
pub trait StopSignal {
    fn is_stop_requested(&self) -> bool;
}

/// Stop once a wall-clock budget is spent.
pub struct Deadline {
    until: std::time::Instant,
}

impl Deadline {
    pub fn after(budget: std::time::Duration) -> Self {
        Deadline {
            until: std::time::Instant::now() + budget,
        }
    }
}

impl StopSignal for Deadline {
    fn is_stop_requested(&self) -> bool {
        std::time::Instant::now() >= self.until
    }
}

impl<T: StopSignal> StopSignal for Option<T> {
    fn is_stop_requested(&self) -> bool {
        self.as_ref().is_some_and(|s| s.is_stop_requested())
    }
}

/// Everything a driver needs besides its own parameters.
pub struct RunContext<'a> {
    pub checkpoint: checkpoint::Checkpointer,
    pub solutions: &'a mut dyn output::SolutionSink,
    pub stats: Option<output::StatsLog>,
    pub stop: &'a dyn StopSignal,
    pub progress: &'a progress::Progress,
}

/// How a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The whole slice was searched; the checkpoint was removed.
    Completed,
    /// A stop was requested; the checkpoint holds the resume position.
    Interrupted,
}
