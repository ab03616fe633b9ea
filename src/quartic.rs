//! # Quartic — Euler(4,1,3) Search Driver
//!
//! Searches a⁴ = b⁴ + c⁴ + d⁴ with a below `Range = R · 10,240,000`.
//!
//! ## Outer Structure
//!
//! a is indexed by a₀ = a mod 16384; only a₀ ≡ 1 (mod 8) can carry a
//! primitive solution. Each a₀ runs one or two [`Phase`]s, and each phase
//! walks its partner residues b₀ = b mod 16384. For one (a₀, b₀) the pairs
//! (a, b) are produced by lifting both through every unit class mod 625
//! compatible with 5 | c·d, then stepping a − b and b by 10,240,000. Both
//! a − b and a + b must pass [`ExponentSieve::exponent_shape_ok`].
//!
//! ## Pair Check
//!
//! [`PairChecker::check`] looks for the two remaining terms of
//! a⁴ − b⁴ = c⁴ + d⁴:
//!
//! 1. Prefilter N = (a² − b²)(a² + b²) as a sum of two 4th powers mod 13, 29.
//! 2. Pull the common factor M of c and d out of N: the 2-adic part from
//!    v₂(N), then every odd p ≢ 1 (mod 8), whose exponent must be ≡ 0 mod 4.
//!    N' = N / M⁴ = c'⁴ + d'⁴.
//! 3. Screen N' mod 16, 5, 13, 29 and pick an anchor class for c' mod 3125,
//!    243 or 64.
//! 4. Retarget the residue battery at N', fold primes into two residue lists
//!    ([`FoldPlan`]) and CRT-join anchor × left × right. Every joined residue
//!    seeds a progression of c' ≤ a / M, screened by the unfolded primes.
//! 5. Reconstruct d from c = c'·M and certify.
//!
//! All of this stays in u64, with N' held in u128.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info};

use crate::checkpoint::CheckpointRecord;
use crate::config::{EngineConfig, QuarticConfig};
use crate::filter::{ExponentSieve, ResidueFilter};
use crate::fold::FoldPlan;
use crate::residue::{power_residue, InverseResidueIndex, PowerResidueTable, SumOfTwoPowers};
use crate::sieve::{generate_primes, isqrt, valuation, CrtPair};
use crate::verify::{Reconstructor, Solution, VerificationPrimes};
use crate::{Family, Outcome, RunContext, SearchMode};

/// a₀ and b₀ are residues mod 2¹⁴.
pub const OUTER_MODULUS: u64 = 16_384;
/// Unit classes of the 5-adic lift.
pub const FIVE_MODULUS: u64 = 625;
/// One range block: a and b step by this.
pub const BLOCK: u64 = OUTER_MODULUS * FIVE_MODULUS;
/// Keeps a² + b² inside u64.
pub const MAX_RANGE_PARAMETER: u64 = 194;

// ── Phases ──────────────────────────────────────────────────────

/// Which term of the right-hand side plays b.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// b is the odd term; b₀ ≡ ±a₀ (mod 1024).
    OddPartner,
    /// b is an even term, b ≡ 0 (mod 8).
    EvenPartner,
}

impl Phase {
    /// Checkpoint marker.
    pub fn marker(self) -> u8 {
        match self {
            Phase::OddPartner => 0,
            Phase::EvenPartner => 1,
        }
    }

    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(Phase::OddPartner),
            1 => Some(Phase::EvenPartner),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::OddPartner => "odd-partner",
            Phase::EvenPartner => "even-partner",
        }
    }

    /// Partner residues b₀ for `a0`, ascending.
    pub fn partners(self, a0: u64) -> Vec<u64> {
        match self {
            Phase::OddPartner => {
                let r = a0 % 1024;
                let s = (1024 - r) % 1024;
                (0..OUTER_MODULUS)
                    .filter(|b0| {
                        let m = b0 % 1024;
                        m == r || m == s
                    })
                    .collect()
            }
            Phase::EvenPartner => (0..OUTER_MODULUS).step_by(8).collect(),
        }
    }

    /// The 2-adic shape of N every pair of this phase has.
    ///
    /// Odd partner: v₂(a ∓ b) ≥ 10 for one sign and 1 for the other, and
    /// v₂(a² + b²) = 1, so e₂ ≥ 12. Even partner: a odd and b even make both
    /// factors odd, so e₂ = 0.
    pub fn two_adic_holds(self, e2: u32) -> bool {
        match self {
            Phase::OddPartner => e2 >= 12,
            Phase::EvenPartner => e2 == 0,
        }
    }
}

/// v₂((a² − b²)(a² + b²)).
pub fn two_adic_exponent(a: u64, b: u64) -> u32 {
    let (a2, b2) = (a * a, b * b);
    (a2 - b2).trailing_zeros() + (a2 + b2).trailing_zeros()
}

// ── Parameters ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarticParams {
    pub range_parameter: u64,
    pub mode: SearchMode,
    /// First a₀ of the slice.
    pub start: u64,
    /// Last a₀ of the slice, inclusive.
    pub end: u64,
}

impl QuarticParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RANGE_PARAMETER).contains(&self.range_parameter) {
            bail!(
                "range parameter must be in 1..={}, got {}",
                MAX_RANGE_PARAMETER,
                self.range_parameter
            );
        }
        if self.start > self.end {
            bail!("start {} exceeds end {}", self.start, self.end);
        }
        if self.end >= OUTER_MODULUS {
            bail!("end {} must be below {}", self.end, OUTER_MODULUS);
        }
        Ok(())
    }

    pub fn range(&self) -> u64 {
        self.range_parameter * BLOCK
    }

    pub fn phases(&self) -> &'static [Phase] {
        match self.mode {
            SearchMode::Full => &[Phase::OddPartner, Phase::EvenPartner],
            SearchMode::Special => &[Phase::OddPartner],
        }
    }

    fn record(&self, a0: u64, phase: Phase, inner_start: u64) -> CheckpointRecord {
        CheckpointRecord {
            family: Family::Quartic,
            range_parameter: self.range_parameter,
            mode: self.mode,
            start_index: self.start,
            end_index: self.end,
            current_index: a0,
            phase: phase.marker(),
            inner_start,
        }
    }

    fn check_resume(&self, record: &CheckpointRecord) -> Result<()> {
        if record.range_parameter != self.range_parameter
            || record.mode != self.mode
            || record.start_index != self.start
            || record.end_index != self.end
        {
            bail!(
                "checkpoint is for range parameter {} ({}) slice [{}, {}]",
                record.range_parameter,
                record.mode,
                record.start_index,
                record.end_index
            );
        }
        let Some(phase) = Phase::from_marker(record.phase) else {
            bail!("unknown phase marker {}", record.phase);
        };
        if !self.phases().contains(&phase) {
            bail!("phase {} is not searched in {} mode", phase.name(), self.mode);
        }
        if record.inner_start > OUTER_MODULUS {
            bail!("inner_start {} out of range", record.inner_start);
        }
        Ok(())
    }
}

// ── Tables ──────────────────────────────────────────────────────

/// Everything the quartic search precomputes once per run.
pub struct QuarticTables {
    range: u64,
    sieve: ExponentSieve,
    outer_crt: CrtPair,
    fourth_625: PowerResidueTable,
    units_625: InverseResidueIndex,
    units_3125: InverseResidueIndex,
    units_243: InverseResidueIndex,
    units_256: InverseResidueIndex,
    sum13: SumOfTwoPowers,
    sum29: SumOfTwoPowers,
    /// Odd primes p ≢ 1 (mod 8) up to √(2·Range).
    strip_primes: Vec<u64>,
}

/// Common factor M of c and d and the reduced target N' = c'⁴ + d'⁴.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reduction {
    pub multiplier: u64,
    pub reduced: u128,
    /// Largest c' = c / M worth enumerating.
    pub bound: u64,
}

impl QuarticTables {
    pub fn new(range: u64) -> Result<Self> {
        let Some(outer_crt) = CrtPair::new(OUTER_MODULUS, FIVE_MODULUS) else {
            bail!("outer moduli are not coprime");
        };
        let started = Instant::now();
        let limit = 2 * range;
        let sieve = ExponentSieve::new(limit);
        let strip_primes = generate_primes(isqrt(limit))
            .into_iter()
            .filter(|&p| p > 2 && p % 8 != 1)
            .collect();

        let fourth_625 = PowerResidueTable::new(FIVE_MODULUS, 4);
        let units_625 = InverseResidueIndex::coprime(&fourth_625, 5);
        let units_3125 = InverseResidueIndex::coprime(&PowerResidueTable::new(3125, 4), 5);
        let units_243 = InverseResidueIndex::coprime(&PowerResidueTable::new(243, 4), 3);
        let units_256 = InverseResidueIndex::coprime(&PowerResidueTable::new(256, 4), 2);
        let sum13 = SumOfTwoPowers::new(&PowerResidueTable::new(13, 4));
        let sum29 = SumOfTwoPowers::new(&PowerResidueTable::new(29, 4));

        info!(
            range,
            sieve_limit = sieve.limit(),
            survivors = sieve.survivors(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "quartic tables built"
        );
        Ok(QuarticTables {
            range,
            sieve,
            outer_crt,
            fourth_625,
            units_625,
            units_3125,
            units_243,
            units_256,
            sum13,
            sum29,
            strip_primes,
        })
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    pub fn sieve(&self) -> &ExponentSieve {
        &self.sieve
    }

    /// Call `visit(a, b)` for every pair with a ≡ a0, b ≡ b0 (mod 16384)
    /// that survives the outer screens.
    pub fn for_each_pair(&self, a0: u64, phase: Phase, b0: u64, mut visit: impl FnMut(u64, u64)) {
        if phase == Phase::OddPartner {
            let m = 65_536;
            let u = (power_residue(a0, 4, m) + m - power_residue(b0, 4, m)) % m;
            if u >> 12 > 2 {
                return;
            }
        }
        let range = self.range;
        for g in 1..FIVE_MODULUS {
            if g % 5 == 0 {
                continue;
            }
            let a1 = self.outer_crt.combine(a0, g);
            for &b625 in self.units_625.preimages(self.fourth_625.get(g)) {
                let b1 = self.outer_crt.combine(b0, b625 as u64);
                let mut diff = (a1 + BLOCK - b1) % BLOCK;
                if diff == 0 {
                    diff = BLOCK;
                }
                while diff < range {
                    if self.sieve.exponent_shape_ok(diff) {
                        let mut b = b1;
                        while b + diff < range {
                            let a = b + diff;
                            let top = (power_residue(a, 4, 3125) + 3125 - power_residue(b, 4, 3125)) % 3125;
                            if top / 625 <= 2 && self.sieve.exponent_shape_ok(a + b) {
                                visit(a, b);
                            }
                            b += BLOCK;
                        }
                    }
                    diff += BLOCK;
                }
            }
        }
    }

    /// Steps 1 and 2 of the pair check plus the small-modulus screens.
    pub fn reduce(&self, a: u64, b: u64) -> Option<Reduction> {
        debug_assert!(b < a);
        let (a2, b2) = (a * a, b * b);
        let (diff, sum) = (a2 - b2, a2 + b2);
        let n_mod = |p: u64| (diff % p) * (sum % p) % p;
        if !self.sum13.contains(n_mod(13)) || !self.sum29.contains(n_mod(29)) {
            return None;
        }

        let e2 = diff.trailing_zeros() + sum.trailing_zeros();
        if e2 % 4 > 1 {
            return None;
        }
        let mut multiplier = 1u64 << (e2 / 4);
        let diff = self.strip(diff >> diff.trailing_zeros(), &mut multiplier)?;
        let sum = self.strip(sum >> sum.trailing_zeros(), &mut multiplier)?;
        let reduced = ((diff as u128) * (sum as u128)) << (e2 % 4);

        if reduced % 16 > 2 || reduced % 5 > 2 {
            return None;
        }
        let r = |p: u64| (reduced % p as u128) as u64;
        if !self.sum13.contains(r(13)) || !self.sum29.contains(r(29)) {
            return None;
        }
        Some(Reduction {
            multiplier,
            reduced,
            bound: a / multiplier,
        })
    }

    /// Divide out every strip prime, requiring exponents ≡ 0 (mod 4).
    fn strip(&self, mut n: u64, multiplier: &mut u64) -> Option<u64> {
        for &p in &self.strip_primes {
            if p * p > n {
                // What is left is a product of primes ≡ 1 (mod 8), times at
                // most one other prime to the first power.
                return (n % 8 == 1).then_some(n);
            }
            if n % p == 0 {
                let (v, rest) = valuation(n, p);
                if v % 4 != 0 {
                    return None;
                }
                *multiplier *= p.pow(v / 4);
                n = rest;
            }
        }
        Some(n)
    }

    /// Residue classes of c' fixed by N' alone. Fills `out` and returns
    /// their modulus (1 with the single class 0 when nothing is fixed).
    pub fn anchor(&self, reduced: u128, out: &mut Vec<u64>) -> u64 {
        out.clear();
        let (index, modulus, table_modulus, lift): (&InverseResidueIndex, u64, u64, u64) =
            if reduced % 5 == 1 {
                (&self.units_3125, 3125, 3125, 625)
            } else if reduced % 3 == 1 {
                (&self.units_243, 243, 243, 81)
            } else if reduced % 16 == 1 {
                (&self.units_256, 64, 256, 16)
            } else {
                out.push(0);
                return 1;
            };
        let target = (reduced % table_modulus as u128) as u64;
        for offset in [0, lift] {
            let t = (target + table_modulus - offset) % table_modulus;
            out.extend(
                index
                    .preimages(t)
                    .iter()
                    .map(|&x| x as u64)
                    .filter(|&x| x < modulus),
            );
        }
        modulus
    }
}

// ── Pair Check ──────────────────────────────────────────────────

/// Fold plan of one pair, as reported by the `plan` subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct PairPlan {
    pub a: u64,
    pub b: u64,
    pub reduction: Reduction,
    pub anchor_modulus: u64,
    pub anchors: usize,
    pub fold: FoldPlan,
    /// Battery primes left as post-join screens.
    pub screens: Vec<u64>,
}

/// Reusable scratch state for [`PairChecker::check`].
pub struct PairChecker<'t> {
    tables: &'t QuarticTables,
    battery: ResidueFilter,
    fold_primes: Vec<u64>,
    budget: usize,
    reconstructor: Reconstructor,
    anchors: Vec<u64>,
    left: Vec<u64>,
    right: Vec<u64>,
    candidates: Vec<(u64, usize)>,
    screen: Vec<usize>,
    raw: u64,
}

impl<'t> PairChecker<'t> {
    pub fn new(tables: &'t QuarticTables, config: &QuarticConfig, reconstructor: Reconstructor) -> Self {
        PairChecker {
            tables,
            battery: ResidueFilter::new(&config.battery_primes, 4),
            fold_primes: config.fold_primes.clone(),
            budget: config.table_budget,
            reconstructor,
            anchors: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            candidates: Vec::new(),
            screen: Vec::new(),
            raw: 0,
        }
    }

    /// Candidates handed to reconstruction so far.
    pub fn raw_candidates(&self) -> u64 {
        self.raw
    }

    /// Reduce, anchor, retarget the battery and fold. None if the pair is
    /// rejected before the join.
    fn prepare(&mut self, a: u64, b: u64) -> Option<(Reduction, u64, FoldPlan)> {
        let reduction = self.tables.reduce(a, b)?;
        let n = reduction.reduced;
        let mut base = self.tables.anchor(n, &mut self.anchors);
        if self.anchors.is_empty() {
            return None;
        }
        if n % 16 == 2 && base % 2 == 1 {
            // c' and d' are both odd.
            let pair = CrtPair::new(base, 2)?;
            for x in self.anchors.iter_mut() {
                *x = pair.combine(*x, 1);
            }
            base *= 2;
        }

        self.battery.retarget(|p| (n % p as u128) as u64);
        if self.battery.tables().iter().any(|t| t.admissible() == 0) {
            return None;
        }

        self.candidates.clear();
        for &p in &self.fold_primes {
            if base % p == 0 || (n % p as u128 == 0 && p % 8 == 1) {
                continue;
            }
            if let Some(table) = self.battery.table(p) {
                self.candidates.push((p, table.admissible()));
            }
        }
        let plan = FoldPlan::build(&self.candidates, self.budget, base, reduction.bound);
        Some((reduction, base, plan))
    }

    /// The fold plan `check` would use for (a, b).
    pub fn plan(&mut self, a: u64, b: u64) -> Option<PairPlan> {
        let (reduction, base, fold) = self.prepare(a, b)?;
        let screens = self
            .battery
            .tables()
            .iter()
            .map(|t| t.prime())
            .filter(|&p| !fold.is_folded(p))
            .collect();
        Some(PairPlan {
            a,
            b,
            reduction,
            anchor_modulus: base,
            anchors: self.anchors.len(),
            fold,
            screens,
        })
    }

    /// Search the remaining two terms for (a, b); certified solutions are
    /// pushed onto `found`.
    pub fn check(&mut self, a: u64, b: u64, found: &mut Vec<Solution>) {
        let Some((reduction, base, plan)) = self.prepare(a, b) else {
            return;
        };
        plan.left.expand(&self.battery, &mut self.left);
        plan.right.expand(&self.battery, &mut self.right);

        self.screen.clear();
        for (i, table) in self.battery.tables().iter().enumerate() {
            if !plan.is_folded(table.prime()) {
                self.screen.push(i);
            }
        }

        // The anchor modulus has no prime factor above 5 and the fold primes
        // are distinct battery primes ≥ 7, so both joins are coprime.
        let joins = CrtPair::new(base, plan.left.modulus).and_then(|first| {
            CrtPair::new(first.modulus(), plan.right.modulus).map(|second| (first, second))
        });
        debug_assert!(joins.is_some(), "fold moduli share a factor: {:?}", plan);
        let Some((first, second)) = joins else {
            return;
        };
        let step = second.modulus();
        let Reduction {
            multiplier, bound, ..
        } = reduction;
        let tables = self.battery.tables();

        for &s in &self.anchors {
            for &l in &self.left {
                let sl = first.combine(s, l);
                for &r in &self.right {
                    let h = second.combine(sl, r);
                    let mut k = if h == 0 { step } else { h };
                    while k <= bound {
                        if self.screen.iter().all(|&i| tables[i].admits(k)) {
                            self.raw += 1;
                            let c = k * multiplier;
                            if let Some(solution) = self.reconstructor.complete(&[a], &[b, c], a) {
                                found.push(solution);
                            }
                        }
                        k += step;
                    }
                }
            }
        }
    }
}

/// Reconstruction and certification for the quartic family.
pub fn reconstructor(config: &EngineConfig) -> Result<Reconstructor> {
    Reconstructor::new(
        Family::Quartic,
        config.verification.aux_primes,
        VerificationPrimes::new(config.quartic.verification_primes.clone()),
    )
}

// ── Driver ──────────────────────────────────────────────────────

/// Search the slice `params`, resuming from and maintaining the checkpoint
/// in `ctx`.
pub fn run(params: &QuarticParams, config: &EngineConfig, ctx: &mut RunContext<'_>) -> Result<Outcome> {
    params.validate()?;
    let range = params.range();
    let reconstructor = reconstructor(config)?;
    if !reconstructor.verification().certifies(range, 4, 3) {
        bail!("quartic verification primes cannot certify range {}", range);
    }
    if reconstructor.reach() <= range {
        bail!("auxiliary primes cannot reconstruct values up to {}", range);
    }

    let resume = ctx
        .checkpoint
        .load(Family::Quartic, |record| params.check_resume(record))?;
    let (first_a0, first_marker, first_inner) = match resume {
        Some(r) => (r.current_index, r.phase, r.inner_start),
        None => (params.start, 0, 0),
    };

    info!(
        range_parameter = params.range_parameter,
        range,
        mode = %params.mode,
        start = params.start,
        end = params.end,
        "quartic search starting"
    );
    let tables = QuarticTables::new(range)?;
    let mut checker = PairChecker::new(&tables, &config.quartic, reconstructor);
    let mut found = Vec::new();

    for a0 in first_a0..=params.end {
        if a0 % 8 != 1 {
            continue;
        }
        for &phase in params.phases() {
            let resuming = a0 == first_a0;
            if resuming && phase.marker() < first_marker {
                continue;
            }
            let inner = if resuming && phase.marker() == first_marker {
                first_inner
            } else {
                0
            };
            let started = Instant::now();

            for b0 in phase.partners(a0).into_iter().filter(|&b0| b0 >= inner) {
                ctx.progress
                    .set_current(format!("a0={} phase={} b0={}", a0, phase.name(), b0));
                let mut pairs = 0u64;
                tables.for_each_pair(a0, phase, b0, |a, b| {
                    pairs += 1;
                    checker.check(a, b, &mut found);
                });
                ctx.progress.pairs.fetch_add(pairs, Ordering::Relaxed);
                ctx.progress
                    .candidates
                    .store(checker.raw_candidates(), Ordering::Relaxed);
                for solution in found.drain(..) {
                    if ctx.solutions.record(&solution)? {
                        ctx.progress.found.fetch_add(1, Ordering::Relaxed);
                    }
                }

                let record = params.record(a0, phase, b0 + 1);
                if ctx.stop.is_stop_requested() {
                    ctx.checkpoint.save(&record)?;
                    info!(a0, phase = phase.name(), b0, "stop requested, checkpoint saved");
                    return Ok(Outcome::Interrupted);
                }
                ctx.checkpoint.save_if_due(&record)?;
            }

            if let Some(stats) = &ctx.stats {
                stats.finished(a0, phase.name(), range, started.elapsed())?;
            }
            debug!(a0, phase = phase.name(), "phase finished");
        }
    }

    ctx.checkpoint.finish();
    info!(
        start = params.start,
        end = params.end,
        candidates = checker.raw_candidates(),
        "quartic slice complete"
    );
    Ok(Outcome::Completed)
}
