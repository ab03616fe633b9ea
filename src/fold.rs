//! # Fold — Balanced Fingerprint Modulus Selection
//!
//! Chooses which small primes are folded into each side of the
//! meet-in-the-middle join. Each side's residue list is the CRT product of
//! the admissible residues of its primes, so its length is the product of
//! their admissible counts. Folding a prime multiplies one side's length but
//! divides the length of every arithmetic progression walked by the join.
//!
//! ## Greedy Rule
//!
//! Primes are taken in configured order. Each one goes to the side whose
//! modulus product is currently smaller (ties go left), falling back to the
//! other side, and is folded only if
//!
//! - that side's list length stays within the table budget, and
//! - the total join modulus stays below half the progression bound, so
//!   every progression keeps at least two terms.
//!
//! A prime that fits neither side is skipped and stays in the residue battery
//! as a post-join screen.

use serde::Serialize;

use crate::filter::ResidueFilter;
use crate::sieve::CrtPair;

/// Primes folded into one side of the join.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FoldSide {
    pub primes: Vec<u64>,
    pub modulus: u64,
    pub size: usize,
}

impl FoldSide {
    fn empty() -> Self {
        FoldSide {
            primes: Vec::new(),
            modulus: 1,
            size: 1,
        }
    }

    /// Fill `out` with every residue mod `self.modulus` admitted by the
    /// battery tables of this side's primes.
    pub fn expand(&self, filter: &ResidueFilter, out: &mut Vec<u64>) {
        out.clear();
        out.push(0);
        let mut modulus = 1u64;
        let mut next = Vec::with_capacity(self.size);
        for &p in &self.primes {
            let Some(table) = filter.table(p) else {
                continue;
            };
            let Some(pair) = CrtPair::new(modulus, p) else {
                continue;
            };
            next.clear();
            for &r in out.iter() {
                for x in table.admissible_residues() {
                    next.push(pair.combine(r, x));
                }
            }
            std::mem::swap(out, &mut next);
            modulus *= p;
        }
    }
}

/// Result of the greedy fold.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FoldPlan {
    pub left: FoldSide,
    pub right: FoldSide,
    pub skipped: Vec<u64>,
    pub budget: usize,
}

impl FoldPlan {
    /// `candidates` pairs each prime with its admissible residue count.
    /// `base_modulus` is the modulus already fixed by the anchor class and
    /// `bound` the largest value the join enumerates.
    pub fn build(candidates: &[(u64, usize)], budget: usize, base_modulus: u64, bound: u64) -> Self {
        let mut sides = [FoldSide::empty(), FoldSide::empty()];
        let mut skipped = Vec::new();

        for &(p, admissible) in candidates {
            let preferred = if sides[0].modulus <= sides[1].modulus { 0 } else { 1 };
            let total = base_modulus
                .saturating_mul(sides[0].modulus)
                .saturating_mul(sides[1].modulus);
            let room = bound / total.max(1) / 2;

            let fits = |side: &FoldSide| {
                room > p
                    && side
                        .size
                        .checked_mul(admissible)
                        .is_some_and(|s| s <= budget)
            };
            let chosen = [preferred, 1 - preferred]
                .into_iter()
                .find(|&s| fits(&sides[s]));

            match chosen {
                Some(s) => {
                    let side = &mut sides[s];
                    side.primes.push(p);
                    side.modulus *= p;
                    side.size *= admissible;
                }
                None => skipped.push(p),
            }
        }

        let [left, right] = sides;
        FoldPlan {
            left,
            right,
            skipped,
            budget,
        }
    }

    /// Product of both side moduli.
    pub fn modulus(&self) -> u64 {
        self.left.modulus * self.right.modulus
    }

    /// Whether `p` ended up on either side.
    pub fn is_folded(&self, p: u64) -> bool {
        self.left.primes.contains(&p) || self.right.primes.contains(&p)
    }
}
