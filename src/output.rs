//! # Output — Solution and Statistics Files
//!
//! Both files are append-only text. The solution file holds one line per
//! certified identity; a line already present (for example, re-found after a
//! resume redoes part of a checkpoint interval) is not written twice. The
//! statistics file gets one line per finished outer unit and is never read
//! back by the engine.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::verify::Solution;

/// Where certified solutions go.
pub trait SolutionSink {
    /// Store `solution`; false if the sink already held it.
    fn record(&mut self, solution: &Solution) -> Result<bool>;
}

/// In-memory sink, handy for tests and the `verify` subcommand.
impl SolutionSink for Vec<Solution> {
    fn record(&mut self, solution: &Solution) -> Result<bool> {
        if self.contains(solution) {
            return Ok(false);
        }
        self.push(solution.clone());
        Ok(true)
    }
}

/// Append-only solution file with duplicate suppression.
pub struct SolutionLog {
    path: PathBuf,
    seen: HashSet<String>,
}

impl SolutionLog {
    /// Open (or lazily create) the file, remembering the lines it already holds.
    pub fn open(path: &Path) -> Result<Self> {
        let seen = match fs::read_to_string(path) {
            Ok(text) => text.lines().map(str::to_owned).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(SolutionLog {
            path: path.to_path_buf(),
            seen,
        })
    }

    /// Number of distinct lines in the file.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl SolutionSink for SolutionLog {
    fn record(&mut self, solution: &Solution) -> Result<bool> {
        let line = solution.to_string();
        if self.seen.contains(&line) {
            debug!("solution already recorded: {}", line);
            return Ok(false);
        }
        append_line(&self.path, &line)?;
        info!(family = %solution.family, primitive = solution.primitive, "solution found: {}", line);
        self.seen.insert(line);
        Ok(true)
    }
}

/// Append-only run statistics.
pub struct StatsLog {
    path: PathBuf,
}

impl StatsLog {
    pub fn new(path: &Path) -> Self {
        StatsLog {
            path: path.to_path_buf(),
        }
    }

    /// One line per finished outer unit.
    pub fn finished(&self, index: u64, phase: &str, range: u64, elapsed: Duration) -> Result<()> {
        let line = format!(
            "Finished: index={}, phase={}, range={}, time={}, date={}",
            index,
            phase,
            range,
            format_elapsed(elapsed),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        append_line(&self.path, &line)
    }
}

/// `XhYmZs`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{}", line).with_context(|| format!("appending to {}", path.display()))?;
    Ok(())
}
