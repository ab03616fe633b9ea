//! # Residue — Power-Residue Tables and Their Inverses
//!
//! Precomputed, immutable tables built once per run and passed by reference
//! into the filters and drivers.
//!
//! - [`PowerResidueTable`]: `table[i] = i^k mod m`.
//! - [`InverseResidueIndex`]: residue → every value producing it, laid out by
//!   counting sort so each group is a contiguous slice.
//! - [`IsPowerResidueSet`]: membership over `0..2m`, so a difference `u − r`
//!   of two reduced residues can be looked up as `u + m − r` without a `%`.
//! - [`SumOfTwoPowers`]: residues expressible as `x^k + y^k`.
//!
//! ## Counting-Sort Layout
//!
//! Pass 1 counts how many values land on each residue; an exclusive prefix
//! sum turns those counts into offsets; pass 2 drops every value at its
//! residue's cursor and bumps the cursor. The result is one flat `Vec<u32>`
//! of length m (or the number of admitted values) plus m + 1 offsets, with
//! no per-group allocation.

use crate::sieve::mul_mod;

/// `x^k mod m` for the small exponents the engine uses.
///
/// k = 4 and k = 6 run a fixed squaring chain (x², x⁴, x⁶ = x⁴·x²); any other
/// exponent falls back to square-and-multiply.
#[inline]
pub fn power_residue(x: u64, k: u32, m: u64) -> u64 {
    let x = x % m;
    match k {
        4 => {
            let x2 = mul_mod(x, x, m);
            mul_mod(x2, x2, m)
        }
        6 => {
            let x2 = mul_mod(x, x, m);
            let x4 = mul_mod(x2, x2, m);
            mul_mod(x4, x2, m)
        }
        _ => crate::sieve::pow_mod(x, k as u64, m),
    }
}

/// Ordered table of `i^k mod m` for i in `[0, m)`.
#[derive(Debug, Clone)]
pub struct PowerResidueTable {
    modulus: u64,
    exponent: u32,
    residues: Vec<u32>,
}

impl PowerResidueTable {
    pub fn new(modulus: u64, exponent: u32) -> Self {
        debug_assert!(modulus > 0 && modulus <= u32::MAX as u64);
        let residues = (0..modulus)
            .map(|i| power_residue(i, exponent, modulus) as u32)
            .collect();
        PowerResidueTable {
            modulus,
            exponent,
            residues,
        }
    }

    #[inline]
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    #[inline]
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// `x^k mod m` for any x (reduced first).
    #[inline]
    pub fn get(&self, x: u64) -> u64 {
        self.residues[(x % self.modulus) as usize] as u64
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.residues
    }
}

/// Residue → preimages, grouped by counting sort.
#[derive(Debug, Clone)]
pub struct InverseResidueIndex {
    offsets: Vec<u32>,
    values: Vec<u32>,
}

impl InverseResidueIndex {
    /// Group every value in `[0, m)`.
    pub fn new(table: &PowerResidueTable) -> Self {
        Self::build(table, |_| true)
    }

    /// Group only values not divisible by `base` (the unit classes mod p^j).
    pub fn coprime(table: &PowerResidueTable, base: u64) -> Self {
        Self::build(table, |i| i % base != 0)
    }

    fn build(table: &PowerResidueTable, admit: impl Fn(u64) -> bool) -> Self {
        let m = table.modulus() as usize;
        let residues = table.as_slice();

        let mut offsets = vec![0u32; m + 1];
        for (i, &r) in residues.iter().enumerate() {
            if admit(i as u64) {
                offsets[r as usize + 1] += 1;
            }
        }
        for r in 0..m {
            offsets[r + 1] += offsets[r];
        }

        let mut cursor = offsets.clone();
        let mut values = vec![0u32; offsets[m] as usize];
        for (i, &r) in residues.iter().enumerate() {
            if admit(i as u64) {
                let slot = &mut cursor[r as usize];
                values[*slot as usize] = i as u32;
                *slot += 1;
            }
        }

        InverseResidueIndex { offsets, values }
    }

    /// Every admitted x < m with x^k ≡ `residue`, ascending.
    #[inline]
    pub fn preimages(&self, residue: u64) -> &[u32] {
        let r = residue as usize;
        if r + 1 >= self.offsets.len() {
            return &[];
        }
        &self.values[self.offsets[r] as usize..self.offsets[r + 1] as usize]
    }

    /// Total number of grouped values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Whether a value is some `x^k mod m`, indexed over `0..2m`.
#[derive(Debug, Clone)]
pub struct IsPowerResidueSet {
    modulus: u64,
    flags: Vec<bool>,
}

impl IsPowerResidueSet {
    pub fn new(table: &PowerResidueTable) -> Self {
        let m = table.modulus() as usize;
        let mut flags = vec![false; 2 * m];
        for &r in table.as_slice() {
            flags[r as usize] = true;
            flags[r as usize + m] = true;
        }
        IsPowerResidueSet {
            modulus: table.modulus(),
            flags,
        }
    }

    /// `value` must be below 2m.
    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        self.flags[value as usize]
    }

    /// Whether `(u − r) mod m` is a power residue, for reduced u and r.
    #[inline]
    pub fn contains_difference(&self, u: u64, r: u64) -> bool {
        self.flags[(u + self.modulus - r) as usize]
    }

    #[inline]
    pub fn modulus(&self) -> u64 {
        self.modulus
    }
}

/// Residues expressible as `x^k + y^k (mod m)`.
#[derive(Debug, Clone)]
pub struct SumOfTwoPowers {
    modulus: u64,
    flags: Vec<bool>,
}

impl SumOfTwoPowers {
    pub fn new(table: &PowerResidueTable) -> Self {
        let m = table.modulus();
        let mut distinct: Vec<u64> = table.as_slice().iter().map(|&r| r as u64).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let mut flags = vec![false; m as usize];
        for &u in &distinct {
            for &v in &distinct {
                flags[((u + v) % m) as usize] = true;
            }
        }
        SumOfTwoPowers { modulus: m, flags }
    }

    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        self.flags[(value % self.modulus) as usize]
    }
}
