//! # Checkpoint — Resumable Search State Persistence
//!
//! A checkpoint is a short key=value text file recording where a slice stopped:
//!
//! ```text
//! # eulerhunt checkpoint, do not edit
//! family=quartic
//! range_parameter=1
//! search_mode=full
//! start_index=12881
//! end_index=12889
//! current_index=12881
//! phase=1
//! inner_start=4096
//! checksum=5be1…
//! ```
//!
//! Keys appear in exactly this order. `checksum` is the SHA-256 of every key
//! line before it, so hand edits and torn writes are both detected.
//!
//! ## Atomic Writes
//!
//! The file is written to a `.tmp` sibling and renamed into place, so a crash
//! mid-write leaves either the previous checkpoint or the new one.
//!
//! ## Corruption Is Fatal
//!
//! A missing key, an unparsable value, a checksum mismatch or a position that
//! fails validation is unrecoverable: the file is deleted (so the next run
//! starts fresh rather than tripping over it again) and the error propagates
//! to `main`, which exits non-zero.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{Family, SearchMode};

const HEADER: &str = "# eulerhunt checkpoint, do not edit";

const KEYS: [&str; 8] = [
    "family",
    "range_parameter",
    "search_mode",
    "start_index",
    "end_index",
    "current_index",
    "phase",
    "inner_start",
];

/// Resume position of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub family: Family,
    pub range_parameter: u64,
    pub mode: SearchMode,
    pub start_index: u64,
    pub end_index: u64,
    /// Outer index still to be finished.
    pub current_index: u64,
    /// Sub-phase within `current_index`.
    pub phase: u8,
    /// First inner index not yet searched in this sub-phase.
    pub inner_start: u64,
}

impl CheckpointRecord {
    fn body(&self) -> String {
        let values = [
            self.family.to_string(),
            self.range_parameter.to_string(),
            self.mode.to_string(),
            self.start_index.to_string(),
            self.end_index.to_string(),
            self.current_index.to_string(),
            self.phase.to_string(),
            self.inner_start.to_string(),
        ];
        KEYS.iter()
            .zip(values.iter())
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }
}

/// Compute SHA-256 hex digest of a string.
fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write the checkpoint atomically via a .tmp file.
pub fn save(path: &Path, record: &CheckpointRecord) -> Result<()> {
    let body = record.body();
    let text = format!("{}\n{}checksum={}\n", HEADER, body, sha256_hex(&body));

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))?;
    Ok(())
}

/// Parse checkpoint text; every key must be present, in order, with a
/// matching checksum.
pub fn parse(text: &str) -> Result<CheckpointRecord> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty() && !l.starts_with('#'));

    let mut values = Vec::with_capacity(KEYS.len());
    let mut body = String::new();
    for key in KEYS {
        let Some(line) = lines.next() else {
            bail!("missing key '{}'", key);
        };
        let Some((k, v)) = line.split_once('=') else {
            bail!("malformed line '{}'", line);
        };
        if k.trim() != key {
            bail!("expected key '{}', found '{}'", key, k.trim());
        }
        body.push_str(&format!("{}={}\n", key, v.trim()));
        values.push(v.trim().to_string());
    }

    let Some(line) = lines.next() else {
        bail!("missing key 'checksum'");
    };
    match line.split_once('=') {
        Some(("checksum", sum)) if sum.trim() == sha256_hex(&body) => {}
        Some(("checksum", _)) => bail!("checksum mismatch"),
        _ => bail!("expected key 'checksum', found '{}'", line),
    }
    if let Some(extra) = lines.next() {
        bail!("unexpected trailing line '{}'", extra);
    }

    let number = |i: usize| -> Result<u64> {
        values[i]
            .parse::<u64>()
            .with_context(|| format!("bad {} '{}'", KEYS[i], values[i]))
    };
    let record = CheckpointRecord {
        family: values[0].parse()?,
        range_parameter: number(1)?,
        mode: values[2].parse()?,
        start_index: number(3)?,
        end_index: number(4)?,
        current_index: number(5)?,
        phase: u8::try_from(number(6)?).context("bad phase")?,
        inner_start: number(7)?,
    };

    if record.start_index > record.end_index {
        bail!("start_index {} exceeds end_index {}", record.start_index, record.end_index);
    }
    if record.current_index < record.start_index || record.current_index > record.end_index {
        bail!(
            "current_index {} outside [{}, {}]",
            record.current_index,
            record.start_index,
            record.end_index
        );
    }
    Ok(record)
}

/// Load and validate the checkpoint at `path`.
///
/// Returns `Ok(None)` if no checkpoint exists. Any structural problem, a
/// family mismatch, or a failure of the driver's own `validate` deletes the
/// file and returns the error.
pub fn load(
    path: &Path,
    family: Family,
    validate: impl FnOnce(&CheckpointRecord) -> Result<()>,
) -> Result<Option<CheckpointRecord>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };

    let checked = parse(&text).and_then(|record| {
        if record.family != family {
            bail!("checkpoint belongs to the {} search", record.family);
        }
        validate(&record)?;
        Ok(record)
    });

    match checked {
        Ok(record) => {
            info!(
                path = %path.display(),
                index = record.current_index,
                phase = record.phase,
                inner = record.inner_start,
                "resuming from checkpoint"
            );
            Ok(Some(record))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt checkpoint deleted");
            clear(path);
            Err(e.context(format!("corrupt checkpoint {}", path.display())))
        }
    }
}

/// Remove the checkpoint and any leftover .tmp file.
pub fn clear(path: &Path) {
    for file in [path.to_path_buf(), path.with_extension("tmp")] {
        if let Err(e) = remove_if_present(&file) {
            warn!(path = %file.display(), error = %e, "failed to remove checkpoint file");
        }
    }
}

/// `fs::remove_file`, treating an absent file as removed.
fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// A driver's handle on its checkpoint file: load once, then save whenever
/// the wall-clock interval has elapsed or a stop is requested.
pub struct Checkpointer {
    path: PathBuf,
    interval: Duration,
    last_save: Instant,
}

impl Checkpointer {
    pub fn new(path: &Path, interval: Duration) -> Self {
        Checkpointer {
            path: path.to_path_buf(),
            interval,
            last_save: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(
        &self,
        family: Family,
        validate: impl FnOnce(&CheckpointRecord) -> Result<()>,
    ) -> Result<Option<CheckpointRecord>> {
        load(&self.path, family, validate)
    }

    /// Whether the save interval has elapsed since the last write.
    pub fn due(&self) -> bool {
        self.last_save.elapsed() >= self.interval
    }

    pub fn save(&mut self, record: &CheckpointRecord) -> Result<()> {
        save(&self.path, record)?;
        self.last_save = Instant::now();
        debug!(
            index = record.current_index,
            phase = record.phase,
            inner = record.inner_start,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Save only if the interval has elapsed.
    pub fn save_if_due(&mut self, record: &CheckpointRecord) -> Result<()> {
        if self.due() {
            self.save(record)?;
        }
        Ok(())
    }

    /// The slice is complete; remove the file.
    pub fn finish(&self) {
        clear(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CheckpointRecord {
        CheckpointRecord {
            family: Family::Quartic,
            range_parameter: 3,
            mode: SearchMode::Full,
            start_index: 12_881,
            end_index: 12_889,
            current_index: 12_881,
            phase: 1,
            inner_start: 4_096,
        }
    }

    // ── Round Trip ──────────────────────────────────────────────────

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        save(&path, &record()).unwrap();
        let loaded = load(&path, Family::Quartic, |_| Ok(())).unwrap();
        assert_eq!(loaded, Some(record()));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn absent_file_means_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.checkpoint");
        assert_eq!(load(&path, Family::Sextic, |_| Ok(())).unwrap(), None);
    }

    /// Keys are written one per line, in fixed order, after the header.
    #[test]
    fn layout_is_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        save(&path, &record()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let keys: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split('=').next().unwrap())
            .collect();
        assert_eq!(&keys[..8], &KEYS);
        assert_eq!(keys[8], "checksum");
        assert!(text.starts_with(HEADER));
    }

    // ── Corruption ──────────────────────────────────────────────────

    fn assert_fatal(text: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.checkpoint");
        fs::write(&path, text).unwrap();
        assert!(load(&path, Family::Quartic, |_| Ok(())).is_err());
        assert!(!path.exists(), "corrupt checkpoint must be deleted");
    }

    #[test]
    fn hand_edit_breaks_checksum() {
        let body = record().body().replace("inner_start=4096", "inner_start=8192");
        assert_fatal(&format!("{}\n{}checksum={}\n", HEADER, body, sha256_hex(&record().body())));
    }

    #[test]
    fn missing_key_is_fatal() {
        let body: String = record()
            .body()
            .lines()
            .filter(|l| !l.starts_with("phase="))
            .map(|l| format!("{}\n", l))
            .collect();
        assert_fatal(&format!("{}checksum={}\n", body, sha256_hex(&body)));
    }

    #[test]
    fn non_numeric_value_is_fatal() {
        let body = record().body().replace("range_parameter=3", "range_parameter=three");
        assert_fatal(&format!("{}checksum={}\n", body, sha256_hex(&body)));
    }

    #[test]
    fn garbage_is_fatal() {
        assert_fatal("corrupted data!!!");
        assert_fatal("");
    }

    #[test]
    fn current_outside_slice_is_fatal() {
        let mut r = record();
        r.current_index = 20_000;
        let body = r.body();
        assert!(parse(&format!("{}checksum={}\n", body, sha256_hex(&body))).is_err());
    }

    #[test]
    fn family_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        save(&path, &record()).unwrap();
        assert!(load(&path, Family::Sextic, |_| Ok(())).is_err());
        assert!(!path.exists());
    }

    /// Driver-level validation failures are treated like corruption.
    #[test]
    fn driver_validation_failure_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        save(&path, &record()).unwrap();
        let err = load(&path, Family::Quartic, |r| {
            if r.phase > 0 {
                bail!("phase out of range");
            }
            Ok(())
        })
        .unwrap_err();
        assert!(format!("{:#}", err).contains("phase out of range"));
        assert!(!path.exists());
    }

    // ── Checkpointer ────────────────────────────────────────────────

    #[test]
    fn zero_interval_is_always_due() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        let mut cp = Checkpointer::new(&path, Duration::ZERO);
        assert!(cp.due());
        cp.save_if_due(&record()).unwrap();
        assert_eq!(cp.load(Family::Quartic, |_| Ok(())).unwrap(), Some(record()));
        cp.finish();
        assert!(!cp.path().exists());
    }

    #[test]
    fn long_interval_defers_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        let mut cp = Checkpointer::new(&path, Duration::from_secs(3600));
        cp.save_if_due(&record()).unwrap();
        assert!(!path.exists());
        cp.save(&record()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        save(&path, &record()).unwrap();
        clear(&path);
        assert!(!path.exists());
    }

    /// An absent file counts as removed; anything else that blocks removal
    /// is reported, and `clear` leaves it in place without panicking.
    #[test]
    fn removal_failures_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.checkpoint");
        assert!(remove_if_present(&path).is_ok());
        fs::create_dir(&path).unwrap();
        assert!(remove_if_present(&path).is_err());
        clear(&path);
        assert!(path.is_dir());
    }
}
