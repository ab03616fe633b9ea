//! # Progress — Atomic Search Progress Counters
//!
//! Counters shared between the single search thread and a background status
//! reporter. The engine bumps atomics (`pairs`, `candidates`, `found`) and
//! replaces the `current` position string once per inner unit; the reporter
//! only reads them, so it never perturbs the search.
//!
//! ## Background Reporter
//!
//! A dedicated thread logs progress every 30 seconds: pairs screened,
//! candidates handed to verification, solutions found, pair rate and the
//! current position. It shuts down via the `shutdown` flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::output::format_elapsed;

pub struct Progress {
    /// Outer pairs (quartic) or index entries plus probed pairs (sextic).
    pub pairs: AtomicU64,
    /// Raw candidates that reached verification.
    pub candidates: AtomicU64,
    /// Distinct certified solutions.
    pub found: AtomicU64,
    pub current: Mutex<String>,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            pairs: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            found: AtomicU64::new(0),
            current: Mutex::new(String::new()),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn start_reporter(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || {
            let mut last = Instant::now();
            loop {
                thread::sleep(Duration::from_millis(250));
                if progress.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if last.elapsed() >= Duration::from_secs(30) {
                    progress.print_status();
                    last = Instant::now();
                }
            }
        })
    }

    pub fn set_current(&self, position: String) {
        if let Ok(mut current) = self.current.lock() {
            *current = position;
        }
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let pairs = self.pairs.load(Ordering::Relaxed);
        let candidates = self.candidates.load(Ordering::Relaxed);
        let found = self.found.load(Ordering::Relaxed);
        let current = self.current.lock().map(|c| c.clone()).unwrap_or_default();
        let rate = if elapsed.as_secs() > 0 {
            pairs as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            current = %current,
            pairs,
            candidates,
            pairs_per_sec = format_args!("{:.0}", rate),
            found,
            elapsed = %format_elapsed(elapsed),
            "search progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
