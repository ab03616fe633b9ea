//! # Sextic — Euler(6,2,5) Search Driver
//!
//! Searches a⁶ + b⁶ = c⁶ + d⁶ + e⁶ + f⁶ + g⁶ with every term below N.
//!
//! Modulo 7 a sixth power is 0 or 1, so at least three right-hand terms are
//! multiples of 7; call them e ≤ f ≤ g. The outer index is
//! i = (e⁶ + f⁶ + g⁶) mod p for a key prime p > N with p ≡ 2 (mod 3), where
//! every nonzero sixth-power residue has exactly the preimages ±x.
//!
//! ## Stage 1: Triple Index
//!
//! For each multiple-of-7 pair (e, f), g is solved from
//! g⁶ ≡ i − e⁶ − f⁶ (mod p) through the inverse residue index. Each
//! surviving triple is stored in a [`BucketStore`] keyed by its sum mod q,
//! with the sum mod r kept as a tag.
//!
//! ## Stage 2: Pair Join
//!
//! Both (a, b) and (c, d) have the same sum of sixth powers mod 7^j, so the
//! pairs are generated one class k at a time. Within a class they are
//! bucketed by sum mod p; bucket l on the left meets bucket l − i on the
//! right, and the difference of the two sums probes the triple index.
//!
//! ```text
//! (a,b) ∈ bucket l ─┐
//!                   ├─ Δ mod q ──► triples[Δ mod q] ── tag == Δ mod r ──► certify
//! (c,d) ∈ bucket l−i┘
//! ```

use anyhow::{bail, Result};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info};

use crate::checkpoint::CheckpointRecord;
use crate::config::{EngineConfig, SexticConfig};
use crate::index::BucketStore;
use crate::residue::{power_residue, InverseResidueIndex, PowerResidueTable};
use crate::verify::{Reconstructor, Solution, VerificationPrimes};
use crate::{Family, Outcome, RunContext, SearchMode};

/// Sub-phase of one outer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Index,
    Probe,
}

impl Stage {
    pub fn marker(self) -> u8 {
        match self {
            Stage::Index => 0,
            Stage::Probe => 1,
        }
    }

    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(Stage::Index),
            1 => Some(Stage::Probe),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Index => "index",
            Stage::Probe => "probe",
        }
    }
}

/// Outer slice of a sextic run; the moduli come from [`SexticConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SexticParams {
    pub start: u64,
    pub end: u64,
}

impl SexticParams {
    pub fn validate(&self, config: &SexticConfig) -> Result<()> {
        if self.start > self.end {
            bail!("start {} exceeds end {}", self.start, self.end);
        }
        if self.end >= config.key_prime {
            bail!("end {} must be below the key prime {}", self.end, config.key_prime);
        }
        Ok(())
    }

    fn record(&self, config: &SexticConfig, i: u64, stage: Stage, inner_start: u64) -> CheckpointRecord {
        CheckpointRecord {
            family: Family::Sextic,
            range_parameter: config.range,
            mode: SearchMode::Full,
            start_index: self.start,
            end_index: self.end,
            current_index: i,
            phase: stage.marker(),
            inner_start,
        }
    }

    fn check_resume(&self, config: &SexticConfig, record: &CheckpointRecord) -> Result<()> {
        if record.range_parameter != config.range
            || record.start_index != self.start
            || record.end_index != self.end
        {
            bail!(
                "checkpoint is for range {} slice [{}, {}]",
                record.range_parameter,
                record.start_index,
                record.end_index
            );
        }
        if record.mode != SearchMode::Full {
            bail!("the sextic search has no {} mode", record.mode);
        }
        if Stage::from_marker(record.phase).is_none() {
            bail!("unknown stage marker {}", record.phase);
        }
        if record.inner_start > config.class_modulus() {
            bail!("inner_start {} out of range", record.inner_start);
        }
        Ok(())
    }
}

// ── Tables ──────────────────────────────────────────────────────

/// Precomputed residues shared by both stages.
pub struct SexticTables {
    range: u64,
    key_prime: u64,
    class_modulus: u64,
    bucket_modulus: u64,
    tag_prime: u64,
    key_powers: PowerResidueTable,
    key_roots: InverseResidueIndex,
    class_powers: PowerResidueTable,
    class_units: InverseResidueIndex,
    /// x⁶ mod q for x < N.
    bucket_powers: Vec<u64>,
    /// x⁶ mod r for x < N.
    tag_powers: Vec<u64>,
}

impl SexticTables {
    pub fn new(config: &SexticConfig) -> Self {
        let started = Instant::now();
        let key_powers = PowerResidueTable::new(config.key_prime, 6);
        let key_roots = InverseResidueIndex::new(&key_powers);
        let class_powers = PowerResidueTable::new(config.class_modulus(), 6);
        let class_units = InverseResidueIndex::coprime(&class_powers, 7);
        let bucket_powers = (0..config.range)
            .map(|x| power_residue(x, 6, config.bucket_modulus))
            .collect();
        let tag_powers = (0..config.range)
            .map(|x| power_residue(x, 6, config.tag_prime))
            .collect();
        info!(
            range = config.range,
            key_prime = config.key_prime,
            class_modulus = config.class_modulus(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sextic tables built"
        );
        SexticTables {
            range: config.range,
            key_prime: config.key_prime,
            class_modulus: config.class_modulus(),
            bucket_modulus: config.bucket_modulus,
            tag_prime: config.tag_prime,
            key_powers,
            key_roots,
            class_powers,
            class_units,
            bucket_powers,
            tag_powers,
        }
    }

    pub fn class_modulus(&self) -> u64 {
        self.class_modulus
    }

    /// Pair classes worth probing: k mod 7 ∈ {1, 2}.
    pub fn classes(&self) -> impl Iterator<Item = u64> {
        (0..self.class_modulus).filter(|k| matches!(k % 7, 1 | 2))
    }

    /// Every pair (a, b) with a⁶ + b⁶ ≡ k (mod 7^j), a not a multiple of 7.
    ///
    /// k ≡ 1: b is a multiple of 7. k ≡ 2: neither is, and a ≥ b.
    pub fn class_pairs(&self, k: u64, out: &mut Vec<(u32, u32)>) {
        out.clear();
        let (n, cm) = (self.range, self.class_modulus);
        if k % 7 == 1 {
            for &a0 in self.class_units.preimages(k) {
                for a in (a0 as u64..n).step_by(cm as usize) {
                    for b in (0..n).step_by(7) {
                        out.push((a as u32, b as u32));
                    }
                }
            }
        } else {
            for a in 0..n {
                if a % 7 == 0 {
                    continue;
                }
                let t = (k + cm - self.class_powers.get(a)) % cm;
                for &b0 in self.class_units.preimages(t) {
                    for b in (b0 as u64..=a).step_by(cm as usize) {
                        out.push((a as u32, b as u32));
                    }
                }
            }
        }
    }

    #[inline]
    fn key_sum(&self, x: u64, y: u64) -> u64 {
        (self.key_powers.get(x) + self.key_powers.get(y)) % self.key_prime
    }
}

/// One stage-1 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    tag: u32,
    e: u32,
    f: u32,
    g: u32,
}

/// Reusable stage-1 and stage-2 state.
pub struct SexticSearch<'t> {
    tables: &'t SexticTables,
    reconstructor: Reconstructor,
    triples: BucketStore<Triple>,
    pairs: BucketStore<(u32, u32)>,
    pair_list: Vec<(u32, u32)>,
    raw: u64,
}

impl<'t> SexticSearch<'t> {
    pub fn new(tables: &'t SexticTables, reconstructor: Reconstructor) -> Self {
        SexticSearch {
            tables,
            reconstructor,
            triples: BucketStore::new(tables.bucket_modulus as usize),
            pairs: BucketStore::new(tables.key_prime as usize),
            pair_list: Vec::new(),
            raw: 0,
        }
    }

    /// Tag matches handed to certification so far.
    pub fn raw_candidates(&self) -> u64 {
        self.raw
    }

    /// Stage 1 for outer index `i`; returns the number of stored triples.
    pub fn build_index(&mut self, i: u64) -> usize {
        let t = self.tables;
        let (n, p) = (t.range, t.key_prime);
        self.triples.reset();
        for e in (0..n).step_by(7) {
            for f in (e.max(7)..n).step_by(7) {
                let u = (i + 2 * p - t.key_powers.get(e) - t.key_powers.get(f)) % p;
                for &g in t.key_roots.preimages(u) {
                    let g = g as u64;
                    if g < f || g >= n || g % 7 != 0 {
                        continue;
                    }
                    // One term is even and one is a multiple of 3.
                    if e & f & g & 1 == 1 || (e % 3 != 0 && f % 3 != 0 && g % 3 != 0) {
                        continue;
                    }
                    let key = (t.bucket_powers[e as usize]
                        + t.bucket_powers[f as usize]
                        + t.bucket_powers[g as usize])
                        % t.bucket_modulus;
                    let tag = (t.tag_powers[e as usize] + t.tag_powers[f as usize] + t.tag_powers[g as usize])
                        % t.tag_prime;
                    self.triples.insert(
                        key as usize,
                        Triple {
                            tag: tag as u32,
                            e: e as u32,
                            f: f as u32,
                            g: g as u32,
                        },
                    );
                }
            }
        }
        self.triples.len()
    }

    /// Stage 2 for class `k` against the index built for `i`. Returns the
    /// number of pairs in the class.
    pub fn probe_class(&mut self, i: u64, k: u64, found: &mut Vec<Solution>) -> usize {
        let t = self.tables;
        let (p, q, r) = (t.key_prime, t.bucket_modulus, t.tag_prime);
        t.class_pairs(k, &mut self.pair_list);
        self.pairs.reset();
        self.pairs.reserve(self.pair_list.len());
        for &(a, b) in &self.pair_list {
            self.pairs.insert(t.key_sum(a as u64, b as u64) as usize, (a, b));
        }

        for l in self.pairs.keys() {
            let rk = (l as u64 + p - i) % p;
            if !self.pairs.is_occupied(rk as usize) {
                continue;
            }
            for (a, b) in self.pairs.probe(l) {
                let (a, b) = (a as usize, b as usize);
                let left_q = t.bucket_powers[a] + t.bucket_powers[b];
                let left_r = t.tag_powers[a] + t.tag_powers[b];
                for (c, d) in self.pairs.probe(rk as usize) {
                    let (c, d) = (c as usize, d as usize);
                    let dq = (left_q + 2 * q - t.bucket_powers[c] - t.bucket_powers[d]) % q;
                    let dr = (left_r + 2 * r - t.tag_powers[c] - t.tag_powers[d]) % r;
                    for triple in self.triples.probe(dq as usize) {
                        if triple.tag as u64 != dr {
                            continue;
                        }
                        self.raw += 1;
                        let lhs = [a as u64, b as u64];
                        let rhs = [c as u64, d as u64, triple.e as u64, triple.f as u64, triple.g as u64];
                        if let Some(solution) = self.reconstructor.certify(&lhs, &rhs) {
                            found.push(solution);
                        }
                    }
                }
            }
        }
        self.pair_list.len()
    }
}

/// Certification for the sextic family.
pub fn reconstructor(config: &EngineConfig) -> Result<Reconstructor> {
    Reconstructor::new(
        Family::Sextic,
        config.verification.aux_primes,
        VerificationPrimes::new(config.sextic.verification_primes.clone()),
    )
}

// ── Driver ──────────────────────────────────────────────────────

/// Search outer indices `params.start..=params.end`.
pub fn run(params: &SexticParams, config: &EngineConfig, ctx: &mut RunContext<'_>) -> Result<Outcome> {
    let sextic = &config.sextic;
    params.validate(sextic)?;
    let reconstructor = reconstructor(config)?;
    if !reconstructor.verification().certifies(sextic.range, 6, 5) {
        bail!("sextic verification primes cannot certify range {}", sextic.range);
    }

    let resume = ctx
        .checkpoint
        .load(Family::Sextic, |record| params.check_resume(sextic, record))?;
    let (first_i, first_stage, first_class) = match resume {
        Some(r) => (r.current_index, r.phase, r.inner_start),
        None => (params.start, Stage::Index.marker(), 0),
    };

    info!(
        range = sextic.range,
        key_prime = sextic.key_prime,
        start = params.start,
        end = params.end,
        "sextic search starting"
    );
    let tables = SexticTables::new(sextic);
    let mut search = SexticSearch::new(&tables, reconstructor);
    let mut found = Vec::new();

    for i in first_i..=params.end {
        let started = Instant::now();
        // A resume into the probe stage rebuilds the index first.
        let class_start = if i == first_i && first_stage == Stage::Probe.marker() {
            first_class
        } else {
            0
        };

        ctx.progress.set_current(format!("i={} stage=index", i));
        let triples = search.build_index(i);
        ctx.progress.pairs.fetch_add(triples as u64, Ordering::Relaxed);
        debug!(i, triples, "triple index built");

        let record = params.record(sextic, i, Stage::Probe, class_start);
        if ctx.stop.is_stop_requested() {
            ctx.checkpoint.save(&record)?;
            info!(i, "stop requested, checkpoint saved");
            return Ok(Outcome::Interrupted);
        }
        ctx.checkpoint.save_if_due(&record)?;

        for k in tables.classes().filter(|&k| k >= class_start) {
            ctx.progress.set_current(format!("i={} stage=probe k={}", i, k));
            let pairs = search.probe_class(i, k, &mut found);
            ctx.progress.pairs.fetch_add(pairs as u64, Ordering::Relaxed);
            ctx.progress
                .candidates
                .store(search.raw_candidates(), Ordering::Relaxed);
            for solution in found.drain(..) {
                if ctx.solutions.record(&solution)? {
                    ctx.progress.found.fetch_add(1, Ordering::Relaxed);
                }
            }

            let record = params.record(sextic, i, Stage::Probe, k + 1);
            if ctx.stop.is_stop_requested() {
                ctx.checkpoint.save(&record)?;
                info!(i, k, "stop requested, checkpoint saved");
                return Ok(Outcome::Interrupted);
            }
            ctx.checkpoint.save_if_due(&record)?;
        }

        if let Some(stats) = &ctx.stats {
            stats.finished(i, Stage::Probe.name(), sextic.range, started.elapsed())?;
        }
    }

    ctx.checkpoint.finish();
    info!(
        start = params.start,
        end = params.end,
        candidates = search.raw_candidates(),
        "sextic slice complete"
    );
    Ok(Outcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::pow_mod;

    /// N = 1200, 7³ classes, p = 20021, q = 10007.
    fn small() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.sextic.range = 1200;
        config.sextic.key_prime = 20_021;
        config.sextic.class_exponent = 3;
        config.sextic.bucket_modulus = 10_007;
        config
    }

    /// i for the triple (602, 861, 1092) of
    /// 1117⁶ + 770⁶ = 1092⁶ + 861⁶ + 602⁶ + 212⁶ + 84⁶.
    fn known_index() -> u64 {
        [602u64, 861, 1092].iter().map(|&x| pow_mod(x, 6, 20_021)).sum::<u64>() % 20_021
    }

    #[test]
    fn stage_markers_round_trip() {
        for stage in [Stage::Index, Stage::Probe] {
            assert_eq!(Stage::from_marker(stage.marker()), Some(stage));
        }
        assert_eq!(Stage::from_marker(7), None);
    }

    #[test]
    fn classes_skip_multiples_and_threes() {
        let tables = SexticTables::new(&small().sextic);
        let classes: Vec<u64> = tables.classes().collect();
        assert_eq!(classes.len(), 98);
        assert!(classes.iter().all(|k| k % 7 == 1 || k % 7 == 2));
    }

    /// Every generated pair lies in its class, and the known left pair is
    /// among them.
    #[test]
    fn class_pairs_are_in_class() {
        let tables = SexticTables::new(&small().sextic);
        let k = (pow_mod(1117, 6, 343) + pow_mod(770, 6, 343)) % 343;
        assert_eq!(k % 7, 1);
        let mut pairs = Vec::new();
        tables.class_pairs(k, &mut pairs);
        assert!(pairs.contains(&(1117, 770)));
        assert!(pairs.contains(&(212, 84)));
        for &(a, b) in &pairs {
            assert_eq!((pow_mod(a as u64, 6, 343) + pow_mod(b as u64, 6, 343)) % 343, k);
        }
    }

    #[test]
    fn index_holds_known_triple() {
        let config = small();
        let tables = SexticTables::new(&config.sextic);
        let mut search = SexticSearch::new(&tables, reconstructor(&config).unwrap());
        let i = known_index();
        assert!(search.build_index(i) > 0);
        let key = [602u64, 861, 1092].iter().map(|&x| pow_mod(x, 6, 10_007)).sum::<u64>() % 10_007;
        let triples: Vec<Triple> = search.triples.probe(key as usize).collect();
        assert!(triples.iter().any(|t| (t.e, t.f, t.g) == (602, 861, 1092)));
    }

    #[test]
    fn probe_finds_known_identity() {
        let config = small();
        let tables = SexticTables::new(&config.sextic);
        let mut search = SexticSearch::new(&tables, reconstructor(&config).unwrap());
        let i = known_index();
        search.build_index(i);
        let k = (pow_mod(1117, 6, 343) + pow_mod(770, 6, 343)) % 343;
        let mut found = Vec::new();
        search.probe_class(i, k, &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].to_string(),
            "1117^6 + 770^6 = 1092^6 + 861^6 + 602^6 + 212^6 + 84^6 (primitive)"
        );
        assert!(search.raw_candidates() >= 1);
    }

    #[test]
    fn params_validation() {
        let config = small();
        assert!(SexticParams { start: 4895, end: 4899 }.validate(&config.sextic).is_ok());
        assert!(SexticParams { start: 5, end: 4 }.validate(&config.sextic).is_err());
        assert!(SexticParams { start: 0, end: 20_021 }.validate(&config.sextic).is_err());
    }

    #[test]
    fn resume_must_match_slice() {
        let config = small();
        let params = SexticParams { start: 4895, end: 4899 };
        let good = params.record(&config.sextic, 4897, Stage::Probe, 57);
        assert!(params.check_resume(&config.sextic, &good).is_ok());
        let special = CheckpointRecord {
            mode: SearchMode::Special,
            ..good
        };
        assert!(params.check_resume(&config.sextic, &special).is_err());
        let bad_stage = CheckpointRecord { phase: 2, ..good };
        assert!(params.check_resume(&config.sextic, &bad_stage).is_err());
        let past_classes = CheckpointRecord {
            inner_start: 344,
            ..good
        };
        assert!(params.check_resume(&config.sextic, &past_classes).is_err());
    }
}
