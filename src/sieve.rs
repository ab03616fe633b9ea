//! # Sieve — Prime Generation and Modular Arithmetic Utilities
//!
//! Number-theoretic infrastructure shared by both search families. Provides:
//!
//! 1. **Prime generation** via a wheel-30 sieve of Eratosthenes (stores only
//!    residues coprime to {2, 3, 5}).
//! 2. **Modular exponentiation** (`pow_mod`, `mul_mod`) using u128 intermediates.
//! 3. **Extended Euclid** for modular inverses and a two-modulus CRT combiner
//!    (`CrtPair`) with the inverse precomputed, for use inside hot join loops.
//! 4. **p-adic valuation** (`valuation`) used by the exponent-shape tests.
//! 5. **`BitSieve`**, the packed bitmap underneath the exponent-parity sieve.
//!
//! ## Algorithm: Wheel-30 Sieve
//!
//! The sieve tracks only integers coprime to 30 = 2·3·5 (8 residues per 30).
//! Each segment of 30 consecutive integers is packed into a single byte.
//! Complexity: O(n log log n) time, O(n/30) space.
//!
//! ## Algorithm: Garner CRT
//!
//! For coprime m₁, m₂ and residues r₁, r₂ the unique x < m₁·m₂ is
//! x = r₁ + m₁·((r₂ − r₁)·m₁⁻¹ mod m₂). Precomputing m₁⁻¹ mod m₂ once per
//! modulus pair leaves one multiply and one reduction per combination.

/// Generate all primes up to `limit` using a wheel-30 sieve.
pub fn generate_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return vec![];
    }
    if limit < 7 {
        return [2, 3, 5].iter().copied().filter(|&p| p <= limit).collect();
    }

    const RESIDUES: [u8; 8] = [1, 7, 11, 13, 17, 19, 23, 29];
    const RES_TO_IDX: [u8; 30] = [
        255, 0, 255, 255, 255, 255, 255, 1, 255, 255, 255, 2, 255, 3, 255, 255, 255, 4, 255, 5,
        255, 255, 255, 6, 255, 255, 255, 255, 255, 7,
    ];

    let limit = limit as usize;
    let num_segments = limit / 30 + 1;
    let mut sieve = vec![0xFFu8; num_segments];

    let sqrt_limit = isqrt(limit as u64) as usize + 1;
    for seg in 0..num_segments {
        if seg * 30 > sqrt_limit {
            break;
        }
        for &ri in &RESIDUES {
            let n = seg * 30 + ri as usize;
            if n < 7 || n > sqrt_limit {
                continue;
            }
            if sieve[seg] & (1 << RES_TO_IDX[ri as usize]) == 0 {
                continue;
            }
            let mut m = n * n;
            while m <= limit {
                let idx = RES_TO_IDX[m % 30];
                if idx != 255 {
                    sieve[m / 30] &= !(1 << idx);
                }
                m += n;
            }
        }
    }

    let mut primes = Vec::with_capacity(estimate_prime_count(limit));
    primes.extend_from_slice(&[2, 3, 5]);
    for (seg, &byte) in sieve.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for (bit_idx, &r) in RESIDUES.iter().enumerate() {
            if byte & (1 << bit_idx) != 0 {
                let n = seg * 30 + r as usize;
                if n > 5 && n <= limit {
                    primes.push(n as u64);
                }
            }
        }
    }
    primes
}

fn estimate_prime_count(n: usize) -> usize {
    if n < 10 {
        return 4;
    }
    let nf = n as f64;
    (1.3 * nf / nf.ln()) as usize
}

/// Deterministic primality by trial division over 6k ± 1.
///
/// Only used to validate configured moduli at startup, never in a search loop.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut d = 5u64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 || n % (d + 2) == 0 {
            return false;
        }
        d += 6;
    }
    true
}

/// Integer square root (floor).
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

/// (a · b) mod m with a u128 intermediate.
#[inline]
pub fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    (a as u128 * b as u128 % m as u128) as u64
}

/// Modular exponentiation: base^exp mod modulus.
/// Uses u128 intermediates to avoid overflow for moduli up to ~2^63.
pub fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        exp >>= 1;
        base = mul_mod(base, base, modulus);
    }
    result
}

/// Greatest common divisor.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// gcd of every value in `values` (0 for an empty slice).
pub fn gcd_all(values: &[u64]) -> u64 {
    values.iter().fold(0, |g, &v| gcd(g, v))
}

/// Modular inverse via the extended Euclidean algorithm.
/// Returns None when gcd(a, m) ≠ 1 or m < 2.
pub fn mod_inverse(a: u64, m: u64) -> Option<u64> {
    if m < 2 {
        return None;
    }
    let (mut old_r, mut r) = ((a % m) as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m as i128) as u64)
}

/// Split `n` into p^v · rest with p ∤ rest. `n` must be nonzero.
#[inline]
pub fn valuation(mut n: u64, p: u64) -> (u32, u64) {
    let mut v = 0;
    while n % p == 0 {
        n /= p;
        v += 1;
    }
    (v, n)
}

/// Two-modulus CRT combiner with the inverse of m₁ modulo m₂ cached.
#[derive(Debug, Clone, Copy)]
pub struct CrtPair {
    m1: u64,
    m2: u64,
    m1_inv: u64,
}

impl CrtPair {
    /// None if the moduli share a factor or their product overflows u64.
    pub fn new(m1: u64, m2: u64) -> Option<Self> {
        m1.checked_mul(m2)?;
        if m2 == 1 {
            return Some(CrtPair { m1, m2, m1_inv: 0 });
        }
        let m1_inv = mod_inverse(m1, m2)?;
        Some(CrtPair { m1, m2, m1_inv })
    }

    pub fn modulus(&self) -> u64 {
        self.m1 * self.m2
    }

    /// The unique x < m₁·m₂ with x ≡ r₁ (mod m₁) and x ≡ r₂ (mod m₂).
    #[inline]
    pub fn combine(&self, r1: u64, r2: u64) -> u64 {
        if self.m2 == 1 {
            return r1 % self.m1;
        }
        let r1 = r1 % self.m1;
        let diff = (r2 % self.m2 + self.m2 - r1 % self.m2) % self.m2;
        r1 + self.m1 * mul_mod(diff, self.m1_inv, self.m2)
    }
}

/// Packed bit array.
///
/// Bit layout: bit `i` is stored in word `i / 64`, bit position `i % 64`.
/// A set bit means the entry survives; a clear bit means it was eliminated.
pub struct BitSieve {
    words: Vec<u64>,
    len: usize,
}

impl BitSieve {
    /// Create a sieve of `len` bits, all set to 1.
    pub fn new_all_set(len: usize) -> Self {
        let num_words = len.div_ceil(64);
        let mut words = vec![u64::MAX; num_words];
        let extra = num_words * 64 - len;
        if extra > 0 && num_words > 0 {
            words[num_words - 1] >>= extra;
        }
        BitSieve { words, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(
            index < self.len,
            "BitSieve index out of bounds: {} >= {}",
            index,
            self.len
        );
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Count surviving bits using hardware POPCNT.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
