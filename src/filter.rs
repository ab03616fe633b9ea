//! # Filter — Power-Residue Compatibility Tests
//!
//! Cheap, sound superset tests that reject candidates before any index or
//! reconstruction work. A filter must never reject a genuine solution; letting
//! a spurious candidate through only costs time.
//!
//! ## Residue Battery
//!
//! For a target value n (the part of the identity the remaining two terms must
//! sum to) and a small prime p, `A_p[x] = 1` iff `n − x^k` is itself a k-th
//! power residue mod p, i.e. x can be one term of `x^k + y^k ≡ n`. Because k
//! is even, `A_p[x] = A_p[p − x]`, so only half of each table is computed.
//! [`ResidueFilter`] keeps one table per battery prime, reuses the buffers
//! across targets, and short-circuits on the first failing prime.
//!
//! ## Exponent-Parity Sieve
//!
//! In a primitive a⁴ − b⁴ = c⁴ + d⁴ the factors a − b, a + b and a² + b² are
//! pairwise coprime away from 2, and every odd prime p ≢ 1 (mod 8) divides
//! c⁴ + d⁴ to a multiple of 4. So each of a ± b, with 2, 3 and 5 removed, is
//! ≡ 1 (mod 8) and carries only exponents ≡ 0 (mod 4) of primes p ≢ 1
//! (mod 8). [`ExponentSieve`] precomputes the last condition for every
//! admissible value up to `2·Range`: only k ≡ 1 (mod 8) coprime to 15 are
//! stored, eight residues per block of 120, so one u64 word covers 960
//! consecutive integers.

use crate::residue::{IsPowerResidueSet, PowerResidueTable};
use crate::sieve::{generate_primes, isqrt, valuation, BitSieve};

/// `A_p` for one battery prime.
#[derive(Debug, Clone)]
pub struct FilterTable {
    prime: u64,
    powers: PowerResidueTable,
    is_power: IsPowerResidueSet,
    admits: Vec<bool>,
    admissible: usize,
}

impl FilterTable {
    pub fn new(prime: u64, exponent: u32) -> Self {
        let powers = PowerResidueTable::new(prime, exponent);
        let is_power = IsPowerResidueSet::new(&powers);
        FilterTable {
            prime,
            powers,
            is_power,
            admits: vec![false; prime as usize],
            admissible: 0,
        }
    }

    /// Rebuild the table for a new target residue.
    pub fn retarget(&mut self, target: u64) {
        let p = self.prime;
        let target = target % p;
        let mut admissible = 0;
        for x in 0..=p / 2 {
            let ok = self.is_power.contains_difference(target, self.powers.get(x));
            self.admits[x as usize] = ok;
            if x != 0 {
                self.admits[(p - x) as usize] = ok;
            }
            if ok {
                admissible += if x == 0 || 2 * x == p { 1 } else { 2 };
            }
        }
        self.admissible = admissible;
    }

    #[inline]
    pub fn admits(&self, x: u64) -> bool {
        self.admits[(x % self.prime) as usize]
    }

    #[inline]
    pub fn prime(&self) -> u64 {
        self.prime
    }

    /// Number of residues in `[0, p)` the table admits.
    #[inline]
    pub fn admissible(&self) -> usize {
        self.admissible
    }

    pub fn admissible_residues(&self) -> impl Iterator<Item = u64> + '_ {
        self.admits
            .iter()
            .enumerate()
            .filter(|(_, &ok)| ok)
            .map(|(x, _)| x as u64)
    }
}

/// Ordered battery of `A_p` tables.
#[derive(Debug, Clone)]
pub struct ResidueFilter {
    tables: Vec<FilterTable>,
}

impl ResidueFilter {
    /// Tables are evaluated in the order of `primes`.
    pub fn new(primes: &[u64], exponent: u32) -> Self {
        ResidueFilter {
            tables: primes.iter().map(|&p| FilterTable::new(p, exponent)).collect(),
        }
    }

    /// Retarget every table; `residue_of(p)` gives the target mod p.
    pub fn retarget(&mut self, mut residue_of: impl FnMut(u64) -> u64) {
        for table in &mut self.tables {
            let r = residue_of(table.prime);
            table.retarget(r);
        }
    }

    /// Whether x passes every table. Stops at the first rejection.
    #[inline]
    pub fn admits(&self, x: u64) -> bool {
        self.tables.iter().all(|t| t.admits(x))
    }

    pub fn tables(&self) -> &[FilterTable] {
        &self.tables
    }

    pub fn table(&self, prime: u64) -> Option<&FilterTable> {
        self.tables.iter().find(|t| t.prime == prime)
    }
}

/// Residues r in [0, 120) with r ≡ 1 (mod 8) and gcd(r, 15) = 1.
const RESIDUES_120: [u8; 8] = [1, 17, 41, 49, 73, 89, 97, 113];

const fn residue_slots_120() -> [u8; 120] {
    let mut slots = [u8::MAX; 120];
    let mut i = 0;
    while i < RESIDUES_120.len() {
        slots[RESIDUES_120[i] as usize] = i as u8;
        i += 1;
    }
    slots
}

const SLOT_120: [u8; 120] = residue_slots_120();

/// Bit-packed exponent-parity sieve over k ≤ limit, k ≡ 1 (mod 8), gcd(k, 15) = 1.
pub struct ExponentSieve {
    bits: BitSieve,
    limit: u64,
}

impl ExponentSieve {
    /// Sieve with every prime 7 ≤ p ≤ √limit, p ≢ 1 (mod 8).
    pub fn new(limit: u64) -> Self {
        let slots = ((limit / 120 + 1) * 8) as usize;
        let mut bits = BitSieve::new_all_set(slots);
        let bound = isqrt(limit);

        for p in generate_primes(bound) {
            if p < 7 || p % 8 == 1 {
                continue;
            }
            let step = 120 * p;
            for j in 1..120u64 {
                let mut m = p * j;
                if SLOT_120[(m % 120) as usize] == u8::MAX {
                    continue;
                }
                while m <= limit {
                    let (v, _) = valuation(m, p);
                    if v % 4 != 0 {
                        bits.clear(Self::slot(m));
                    }
                    m += step;
                }
            }
        }

        ExponentSieve { bits, limit }
    }

    #[inline]
    fn slot(k: u64) -> usize {
        (k / 120 * 8) as usize + SLOT_120[(k % 120) as usize] as usize
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Look up an admissible k (≡ 1 mod 8, coprime to 15, ≤ limit).
    #[inline]
    pub fn survives(&self, k: u64) -> bool {
        debug_assert!(k <= self.limit && SLOT_120[(k % 120) as usize] != u8::MAX);
        self.bits.get(Self::slot(k))
    }

    /// Number of surviving admissible values.
    pub fn survivors(&self) -> usize {
        self.bits.count_ones()
    }

    /// Full exponent-shape test for a nonzero `k` = a ± b.
    ///
    /// Removes 2s, requires v₃ and v₅ ≡ 0 (mod 4), an odd cofactor ≡ 1 (mod 8)
    /// and a surviving sieve bit.
    #[inline]
    pub fn exponent_shape_ok(&self, k: u64) -> bool {
        let k = k >> k.trailing_zeros();
        let (v3, k) = valuation(k, 3);
        if v3 % 4 != 0 {
            return false;
        }
        let (v5, k) = valuation(k, 5);
        if v5 % 4 != 0 {
            return false;
        }
        k & 7 == 1 && self.survives(k)
    }
}
