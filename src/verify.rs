//! # Verify — Multi-Prime Certification and Reconstruction
//!
//! Raw fingerprint collisions are only modular coincidences. This module turns
//! them into certified solutions:
//!
//! 1. **Agreement** ([`VerificationPrimes::agree`]): both power sums are
//!    reduced modulo every large verification prime and must match for all.
//!    When the product of the primes exceeds the largest value either side
//!    can take ([`VerificationPrimes::certifies`]), agreement implies exact
//!    equality, so no big-integer arithmetic is ever needed.
//! 2. **Reconstruction** ([`Reconstructor::reconstruct`]): a term that was
//!    never enumerated is recovered from `t^k ≡ Σlhs^k − Σrhs^k` modulo two
//!    auxiliary primes. Each prime yields the root pair ±r, and CRT on the
//!    four combinations gives the candidates; only a value in `(0, bound)`
//!    that then certifies is accepted.
//!
//! ## Root Extraction
//!
//! | k | prime class   | root                                   |
//! |---|---------------|----------------------------------------|
//! | 4 | p ≡ 7 (mod 8)  | u^((p+1)/8)                            |
//! | 6 | p ≡ 11 (mod 12) | (u^(3⁻¹ mod p−1))^((p+1)/4)            |
//!
//! In both classes the k-th power map has image of index 2 in (Z/p)^*, so a
//! residue has either no root or exactly the pair ±r.

use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;

use crate::residue::power_residue;
use crate::sieve::{gcd_all, mod_inverse, mul_mod, pow_mod, CrtPair};
use crate::Family;

/// A certified identity, terms sorted descending within each side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Solution {
    pub family: Family,
    pub lhs: Vec<u64>,
    pub rhs: Vec<u64>,
    pub primitive: bool,
}

impl Solution {
    pub fn new(family: Family, mut lhs: Vec<u64>, mut rhs: Vec<u64>) -> Self {
        lhs.sort_unstable_by(|a, b| b.cmp(a));
        rhs.sort_unstable_by(|a, b| b.cmp(a));
        let all: Vec<u64> = lhs.iter().chain(rhs.iter()).copied().collect();
        let primitive = gcd_all(&all) == 1;
        Solution {
            family,
            lhs,
            rhs,
            primitive,
        }
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = self.family.exponent();
        let side = |terms: &[u64]| {
            terms
                .iter()
                .map(|t| format!("{}^{}", t, k))
                .collect::<Vec<_>>()
                .join(" + ")
        };
        write!(f, "{} = {}", side(&self.lhs), side(&self.rhs))?;
        if self.primitive {
            write!(f, " (primitive)")?;
        }
        Ok(())
    }
}

/// Large primes used only for certification.
#[derive(Debug, Clone)]
pub struct VerificationPrimes {
    primes: Vec<u64>,
}

impl VerificationPrimes {
    pub fn new(primes: Vec<u64>) -> Self {
        VerificationPrimes { primes }
    }

    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    /// Σ lhs^k ≡ Σ rhs^k modulo every verification prime.
    pub fn agree(&self, lhs: &[u64], rhs: &[u64], k: u32) -> bool {
        self.primes.iter().all(|&p| {
            let sum = |terms: &[u64]| {
                terms
                    .iter()
                    .fold(0u64, |acc, &t| (acc + power_residue(t, k, p)) % p)
            };
            sum(lhs) == sum(rhs)
        })
    }

    /// Whether agreement is exact for `terms` values below `bound`, i.e.
    /// Π primes > terms · bound^k.
    ///
    /// Compared exactly in u128. A bound whose power does not fit is never
    /// certified; a prime product past u128 exceeds every bound that does.
    pub fn certifies(&self, bound: u64, k: u32, terms: usize) -> bool {
        let Some(largest) = (bound as u128)
            .checked_pow(k)
            .and_then(|power| power.checked_mul(terms as u128))
        else {
            return false;
        };
        self.primes
            .iter()
            .try_fold(1u128, |product, &p| product.checked_mul(p as u128))
            .map_or(true, |product| product > largest)
    }
}

/// k-th root extraction modulo a prime in the matching class.
#[derive(Debug, Clone, Copy)]
pub struct RootExtractor {
    prime: u64,
    exponent: u32,
    root_exp: u64,
}

impl RootExtractor {
    pub fn new(exponent: u32, prime: u64) -> Result<Self> {
        let root_exp = match exponent {
            4 => {
                if prime % 8 != 7 {
                    bail!("fourth roots need p ≡ 7 (mod 8), got {}", prime);
                }
                (prime + 1) / 8
            }
            6 => {
                if prime % 12 != 11 {
                    bail!("sixth roots need p ≡ 11 (mod 12), got {}", prime);
                }
                let Some(cube) = mod_inverse(3, prime - 1) else {
                    bail!("3 is not invertible mod {}", prime - 1);
                };
                mul_mod(cube, (prime + 1) / 4, prime - 1)
            }
            k => bail!("no root extraction for exponent {}", k),
        };
        Ok(RootExtractor {
            prime,
            exponent,
            root_exp,
        })
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    /// The pair (r, p − r) with r^k ≡ u, or None if u is not a k-th power.
    #[inline]
    pub fn roots(&self, u: u64) -> Option<(u64, u64)> {
        let u = u % self.prime;
        if u == 0 {
            return Some((0, 0));
        }
        let r = pow_mod(u, self.root_exp, self.prime);
        if power_residue(r, self.exponent, self.prime) != u {
            return None;
        }
        Some((r, self.prime - r))
    }
}

/// Recovers the one term a search never enumerates, then certifies.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    family: Family,
    aux: [RootExtractor; 2],
    crt: CrtPair,
    verification: VerificationPrimes,
}

impl Reconstructor {
    pub fn new(family: Family, aux_primes: [u64; 2], verification: VerificationPrimes) -> Result<Self> {
        let k = family.exponent();
        let aux = [
            RootExtractor::new(k, aux_primes[0])?,
            RootExtractor::new(k, aux_primes[1])?,
        ];
        let Some(crt) = CrtPair::new(aux_primes[0], aux_primes[1]) else {
            bail!(
                "auxiliary primes {} and {} must be distinct",
                aux_primes[0],
                aux_primes[1]
            );
        };
        Ok(Reconstructor {
            family,
            aux,
            crt,
            verification,
        })
    }

    pub fn verification(&self) -> &VerificationPrimes {
        &self.verification
    }

    /// Largest value reconstruction can return unambiguously.
    pub fn reach(&self) -> u64 {
        self.crt.modulus()
    }

    /// The missing right-hand term t ∈ (0, bound) with
    /// Σ lhs^k = Σ known_rhs^k + t^k, if one exists.
    pub fn reconstruct(&self, lhs: &[u64], known_rhs: &[u64], bound: u64) -> Option<u64> {
        let k = self.family.exponent();
        let residue = |p: u64| {
            let left = lhs.iter().fold(0, |acc, &t| (acc + power_residue(t, k, p)) % p);
            let right = known_rhs
                .iter()
                .fold(0, |acc, &t| (acc + power_residue(t, k, p)) % p);
            (left + p - right) % p
        };
        let (r1, s1) = self.aux[0].roots(residue(self.aux[0].prime()))?;
        let (r2, s2) = self.aux[1].roots(residue(self.aux[1].prime()))?;

        for x in [r1, s1] {
            for y in [r2, s2] {
                let t = self.crt.combine(x, y);
                if t == 0 || t >= bound {
                    continue;
                }
                let mut rhs = known_rhs.to_vec();
                rhs.push(t);
                if self.verification.agree(lhs, &rhs, k) {
                    return Some(t);
                }
            }
        }
        None
    }

    /// Certify a fully known tuple.
    pub fn certify(&self, lhs: &[u64], rhs: &[u64]) -> Option<Solution> {
        if !self.verification.agree(lhs, rhs, self.family.exponent()) {
            return None;
        }
        Some(Solution::new(self.family, lhs.to_vec(), rhs.to_vec()))
    }

    /// Reconstruct the missing term and return the certified solution.
    pub fn complete(&self, lhs: &[u64], known_rhs: &[u64], bound: u64) -> Option<Solution> {
        let t = self.reconstruct(lhs, known_rhs, bound)?;
        let mut rhs = known_rhs.to_vec();
        rhs.push(t);
        Some(Solution::new(self.family, lhs.to_vec(), rhs))
    }
}
