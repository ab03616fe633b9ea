//! Engine configuration: TOML with every field defaulted to the tuned values.
//!
//! ```toml
//! checkpoint_interval_secs = 600
//!
//! [quartic]
//! battery_primes = [7, 13, 17, 29, 37, 41, 53, 61, 73, 89, 97, 101, 109, 113, 137]
//! fold_primes = [13, 17, 29, 37, 41, 53, 61, 73, 89, 97, 7]
//! table_budget = 262144
//!
//! [sextic]
//! range = 117649
//! key_prime = 117659
//! class_exponent = 6
//!
//! [verification]
//! aux_primes = [1000151, 1000199]
//! ```
//!
//! An absent file means all defaults. Unknown keys are rejected so a typo
//! never silently falls back to a default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::sieve::is_prime;
use crate::verify::VerificationPrimes;

// ── TOML Configuration Structs ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds between periodic checkpoint writes.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
    #[serde(default)]
    pub quartic: QuarticConfig,
    #[serde(default)]
    pub sextic: SexticConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            checkpoint_interval_secs: default_checkpoint_interval(),
            quartic: QuarticConfig::default(),
            sextic: SexticConfig::default(),
            verification: VerificationConfig::default(),
        }
    }
}

fn default_checkpoint_interval() -> u64 {
    600
}

/// The `[quartic]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct QuarticConfig {
    /// Residue battery, evaluated in this order.
    pub battery_primes: Vec<u64>,
    /// Fold candidates, offered to the greedy fold in this order.
    pub fold_primes: Vec<u64>,
    /// Largest residue list either fold side may hold.
    pub table_budget: usize,
    pub verification_primes: Vec<u64>,
}

impl Default for QuarticConfig {
    fn default() -> Self {
        QuarticConfig {
            battery_primes: vec![7, 13, 17, 29, 37, 41, 53, 61, 73, 89, 97, 101, 109, 113, 137],
            fold_primes: vec![13, 17, 29, 37, 41, 53, 61, 73, 89, 97, 7],
            table_budget: 262_144,
            verification_primes: vec![
                1_000_000_007,
                1_000_000_009,
                1_000_000_021,
                1_000_000_033,
                1_000_000_087,
            ],
        }
    }
}

/// The `[sextic]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SexticConfig {
    /// Every term is below this.
    pub range: u64,
    /// Prime keying the outer index; p > range and p ≡ 2 (mod 3).
    pub key_prime: u64,
    /// Pair classes are taken mod 7^class_exponent.
    pub class_exponent: u32,
    /// Bucket count of the triple index.
    pub bucket_modulus: u64,
    /// Prime for the tag stored beside each triple.
    pub tag_prime: u64,
    pub verification_primes: Vec<u64>,
}

impl Default for SexticConfig {
    fn default() -> Self {
        SexticConfig {
            range: 117_649,
            key_prime: 117_659,
            class_exponent: 6,
            bucket_modulus: 4_200_013,
            tag_prime: 1_000_000_007,
            verification_primes: vec![100_000_007, 100_000_037, 100_000_039, 100_000_049, 100_000_073],
        }
    }
}

impl SexticConfig {
    pub fn class_modulus(&self) -> u64 {
        7u64.pow(self.class_exponent)
    }
}

/// The `[verification]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    /// Root-extraction primes; ≡ 23 (mod 24) serves both exponents.
    pub aux_primes: [u64; 2],
}

impl Default for VerificationConfig {
    fn default() -> Self {
        VerificationConfig {
            aux_primes: [1_000_151, 1_000_199],
        }
    }
}

// ── TOML Parsing ────────────────────────────────────────────────

/// Parse and validate an engine configuration from a TOML string.
pub fn parse_toml(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the configuration at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        let config = EngineConfig::default();
        validate_config(&config)?;
        return Ok(config);
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_toml(&content).with_context(|| format!("invalid config {}", path.display()))
}

/// Largest quartic range the engine supports: 194 blocks of 10,240,000.
const QUARTIC_MAX_RANGE: u64 = 194 * 10_240_000;

/// Validate an engine configuration for internal consistency.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let [p1, p2] = config.verification.aux_primes;
    for p in [p1, p2] {
        if !is_prime(p) {
            anyhow::bail!("verification.aux_primes: {} is not prime", p);
        }
        if p % 24 != 23 {
            anyhow::bail!("verification.aux_primes: {} must be ≡ 23 (mod 24)", p);
        }
    }
    if p1 == p2 {
        anyhow::bail!("verification.aux_primes must be distinct");
    }
    let reach = p1.saturating_mul(p2);

    let q = &config.quartic;
    if q.battery_primes.is_empty() {
        anyhow::bail!("quartic.battery_primes must not be empty");
    }
    if let Some(&p) = q.battery_primes.iter().find(|&&p| !is_prime(p) || p < 7) {
        anyhow::bail!("quartic.battery_primes: {} is not a prime ≥ 7", p);
    }
    if let Some(p) = first_duplicate(&q.battery_primes) {
        anyhow::bail!("quartic.battery_primes: duplicate prime {}", p);
    }
    if let Some(&p) = q.fold_primes.iter().find(|p| !q.battery_primes.contains(p)) {
        anyhow::bail!("quartic.fold_primes: {} is not in the battery", p);
    }
    // A prime folded on both sides leaves the CRT join without a solution.
    if let Some(p) = first_duplicate(&q.fold_primes) {
        anyhow::bail!("quartic.fold_primes: duplicate prime {}", p);
    }
    if q.table_budget == 0 {
        anyhow::bail!("quartic.table_budget must be positive");
    }
    validate_verification_primes("quartic", &q.verification_primes, QUARTIC_MAX_RANGE, 4, 3)?;
    if reach <= QUARTIC_MAX_RANGE {
        anyhow::bail!("verification.aux_primes product {} cannot reach the quartic range", reach);
    }

    let s = &config.sextic;
    if s.range < 8 || s.range > u32::MAX as u64 {
        anyhow::bail!("sextic.range {} out of bounds", s.range);
    }
    if !is_prime(s.key_prime) || s.key_prime % 3 != 2 {
        anyhow::bail!("sextic.key_prime {} must be a prime ≡ 2 (mod 3)", s.key_prime);
    }
    if s.key_prime <= s.range {
        anyhow::bail!(
            "sextic.key_prime {} must exceed sextic.range {}",
            s.key_prime,
            s.range
        );
    }
    if !(1..=6).contains(&s.class_exponent) {
        anyhow::bail!("sextic.class_exponent must be in 1..=6, got {}", s.class_exponent);
    }
    if s.bucket_modulus < 2 || s.bucket_modulus > u32::MAX as u64 {
        anyhow::bail!("sextic.bucket_modulus {} out of bounds", s.bucket_modulus);
    }
    if !is_prime(s.tag_prime) || s.tag_prime > u32::MAX as u64 {
        anyhow::bail!("sextic.tag_prime {} must be a prime below 2^32", s.tag_prime);
    }
    validate_verification_primes("sextic", &s.verification_primes, s.range, 6, 5)?;
    if reach <= s.range {
        anyhow::bail!("verification.aux_primes product {} cannot reach the sextic range", reach);
    }

    Ok(())
}

fn first_duplicate(primes: &[u64]) -> Option<u64> {
    let mut sorted = primes.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).find(|w| w[0] == w[1]).map(|w| w[0])
}

fn validate_verification_primes(
    section: &str,
    primes: &[u64],
    range: u64,
    exponent: u32,
    terms: usize,
) -> Result<()> {
    if let Some(&p) = primes.iter().find(|&&p| !is_prime(p)) {
        anyhow::bail!("{}.verification_primes: {} is not prime", section, p);
    }
    if !VerificationPrimes::new(primes.to_vec()).certifies(range, exponent, terms) {
        anyhow::bail!(
            "{}.verification_primes: product too small to certify {} terms below {}",
            section,
            terms,
            range
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = load_config(None).unwrap();
        assert_eq!(config.checkpoint_interval_secs, 600);
        assert_eq!(config.quartic.fold_primes.last(), Some(&7));
        assert_eq!(config.sextic.class_modulus(), 117_649);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        assert_eq!(parse_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_toml(
            r#"
            checkpoint_interval_secs = 5

            [sextic]
            range = 1200
            key_prime = 20021
            class_exponent = 3
            bucket_modulus = 10007
            "#,
        )
        .unwrap();
        assert_eq!(config.checkpoint_interval_secs, 5);
        assert_eq!(config.sextic.class_modulus(), 343);
        assert_eq!(config.sextic.tag_prime, 1_000_000_007);
        assert_eq!(config.quartic, QuarticConfig::default());
    }

    // ── Validation ──────────────────────────────────────────────────

    fn rejects(toml: &str, needle: &str) {
        let err = parse_toml(toml).unwrap_err();
        assert!(format!("{:#}", err).contains(needle), "{:#}", err);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_toml("[quartic]\nfold_prime = [13]").is_err());
    }

    #[test]
    fn rejects_key_prime_in_wrong_class() {
        // 117673 is prime but ≡ 1 (mod 3)
        rejects("[sextic]\nkey_prime = 117673", "key_prime");
    }

    #[test]
    fn rejects_key_prime_below_range() {
        rejects("[sextic]\nrange = 200000", "must exceed");
    }

    #[test]
    fn rejects_fold_prime_outside_battery() {
        rejects("[quartic]\nfold_primes = [13, 19]", "not in the battery");
    }

    #[test]
    fn rejects_duplicate_primes() {
        rejects("[quartic]\nfold_primes = [13, 13]", "duplicate prime 13");
        rejects(
            "[quartic]\nbattery_primes = [7, 13, 7]\nfold_primes = [13]",
            "duplicate prime 7",
        );
    }

    #[test]
    fn rejects_weak_verification() {
        rejects(
            "[quartic]\nverification_primes = [1000000007, 1000000009]",
            "product too small",
        );
    }

    #[test]
    fn rejects_aux_prime_in_wrong_class() {
        // 1000039 ≡ 7 (mod 8) but ≡ 7 (mod 12)
        rejects("[verification]\naux_primes = [1000039, 1000199]", "23 (mod 24)");
    }

    #[test]
    fn rejects_composite_battery_prime() {
        rejects("[quartic]\nbattery_primes = [7, 15]\nfold_primes = [7]", "not a prime");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
